//! Synchronized table names and their ordering

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A logical collection mirrored between the local store and the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTable {
    Persons,
    Groups,
    Transactions,
    Expenses,
    ExpenseSplits,
    Settlements,
}

/// Returned when a table name is not one of the synchronized tables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown sync table: {0}")]
pub struct UnknownTable(pub String);

impl SyncTable {
    /// Full-sync order. Referenced entities come before the rows that point at them
    /// (persons and groups before expenses, expenses before their splits).
    pub const FULL_SYNC_ORDER: [Self; 6] = [
        Self::Persons,
        Self::Groups,
        Self::Transactions,
        Self::Expenses,
        Self::ExpenseSplits,
        Self::Settlements,
    ];

    /// Tables refreshed by an incremental pull.
    pub const INCREMENTAL: [Self; 4] = [
        Self::Persons,
        Self::Transactions,
        Self::Expenses,
        Self::Settlements,
    ];

    /// Tables with a realtime subscription for the session.
    pub const REALTIME: [Self; 4] = [
        Self::Persons,
        Self::Transactions,
        Self::Expenses,
        Self::Settlements,
    ];

    /// Backend table name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Persons => "persons",
            Self::Groups => "groups",
            Self::Transactions => "transactions",
            Self::Expenses => "expenses",
            Self::ExpenseSplits => "expense_splits",
            Self::Settlements => "settlements",
        }
    }
}

impl fmt::Display for SyncTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncTable {
    type Err = UnknownTable;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::FULL_SYNC_ORDER
            .into_iter()
            .find(|table| table.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownTable(name.to_string()))
    }
}
