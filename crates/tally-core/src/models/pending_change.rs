//! Queued local mutation model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{RecordId, SyncTable};

/// Identifier of a queue entry (distinct from the record it affects)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingChangeId(Uuid);

impl PendingChangeId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for PendingChangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PendingChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

impl ChangeOperation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A local mutation waiting to be applied by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChange {
    pub id: PendingChangeId,
    pub record_id: RecordId,
    pub table: SyncTable,
    pub operation: ChangeOperation,
    /// Record body for insert/update; absent for delete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub timestamp: DateTime<Utc>,
    /// Failed send attempts so far
    #[serde(default)]
    pub retry_count: u32,
}

impl PendingChange {
    #[must_use]
    pub fn insert(
        table: SyncTable,
        record_id: RecordId,
        payload: Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(table, record_id, ChangeOperation::Insert, Some(payload), timestamp)
    }

    #[must_use]
    pub fn update(
        table: SyncTable,
        record_id: RecordId,
        payload: Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(table, record_id, ChangeOperation::Update, Some(payload), timestamp)
    }

    #[must_use]
    pub fn delete(table: SyncTable, record_id: RecordId, timestamp: DateTime<Utc>) -> Self {
        Self::new(table, record_id, ChangeOperation::Delete, None, timestamp)
    }

    #[must_use]
    pub fn new(
        table: SyncTable,
        record_id: RecordId,
        operation: ChangeOperation,
        payload: Option<Value>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PendingChangeId::new(),
            record_id,
            table,
            operation,
            payload,
            timestamp,
            retry_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delete_has_no_payload() {
        let change = PendingChange::delete(SyncTable::Expenses, RecordId::new(), Utc::now());
        assert_eq!(change.operation, ChangeOperation::Delete);
        assert!(change.payload.is_none());
        assert_eq!(change.retry_count, 0);

        let serialized = serde_json::to_value(&change).unwrap();
        assert!(serialized.get("payload").is_none());
        assert_eq!(serialized["operation"], json!("delete"));
        assert_eq!(serialized["table"], json!("expenses"));
    }

    #[test]
    fn entries_get_distinct_ids() {
        let record_id = RecordId::new();
        let first = PendingChange::update(
            SyncTable::Transactions,
            record_id,
            json!({"amount": 1}),
            Utc::now(),
        );
        let second = PendingChange::update(
            SyncTable::Transactions,
            record_id,
            json!({"amount": 2}),
            Utc::now(),
        );
        assert_ne!(first.id, second.id);
        assert_eq!(first.record_id, second.record_id);
    }
}
