//! Synchronized record model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use super::SyncTable;

/// Column names owned by the sync layer rather than the domain.
const ID_FIELD: &str = "id";
const SYNC_VERSION_FIELD: &str = "sync_version";
const UPDATED_AT_FIELD: &str = "updated_at";
const DELETED_AT_FIELD: &str = "deleted_at";

/// A unique identifier for a synchronized record, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// Why a backend row could not be decoded into a [`RemoteRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordDecodeError {
    #[error("row is not a JSON object")]
    NotAnObject,
    #[error("row is missing required field '{0}'")]
    MissingField(&'static str),
    #[error("row has an invalid id: {0}")]
    InvalidId(String),
    #[error("row has an invalid sync_version: {0}")]
    InvalidVersion(String),
    #[error("row has an invalid {field} timestamp: {value}")]
    InvalidTimestamp { field: &'static str, value: String },
}

/// Authoritative state of a record as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    pub id: RecordId,
    pub table: SyncTable,
    /// Incremented by the backend on every write
    pub sync_version: i64,
    /// Server-assigned modification time
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker; `None` means live
    pub deleted_at: Option<DateTime<Utc>>,
    /// Domain columns (everything that is not sync bookkeeping)
    pub fields: Map<String, Value>,
}

impl RemoteRecord {
    /// Decode a backend row. `sync_version` must be a non-negative integer.
    pub fn from_row(table: SyncTable, row: Value) -> Result<Self, RecordDecodeError> {
        let Value::Object(mut fields) = row else {
            return Err(RecordDecodeError::NotAnObject);
        };

        let id = match fields.remove(ID_FIELD) {
            Some(Value::String(raw)) => raw
                .parse::<RecordId>()
                .map_err(|_| RecordDecodeError::InvalidId(raw))?,
            Some(other) => return Err(RecordDecodeError::InvalidId(other.to_string())),
            None => return Err(RecordDecodeError::MissingField(ID_FIELD)),
        };

        let sync_version = match fields.remove(SYNC_VERSION_FIELD) {
            Some(Value::Number(number)) => number
                .as_i64()
                .filter(|version| *version >= 0)
                .ok_or_else(|| RecordDecodeError::InvalidVersion(number.to_string()))?,
            Some(other) => return Err(RecordDecodeError::InvalidVersion(other.to_string())),
            None => return Err(RecordDecodeError::MissingField(SYNC_VERSION_FIELD)),
        };

        let updated_at = parse_timestamp(UPDATED_AT_FIELD, fields.remove(UPDATED_AT_FIELD))?
            .ok_or(RecordDecodeError::MissingField(UPDATED_AT_FIELD))?;
        let deleted_at = parse_timestamp(DELETED_AT_FIELD, fields.remove(DELETED_AT_FIELD))?;

        Ok(Self {
            id,
            table,
            sync_version,
            updated_at,
            deleted_at,
            fields,
        })
    }

    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Local mirror of a synchronized record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRecord {
    pub id: RecordId,
    pub table: SyncTable,
    /// Last version known to be reconciled locally
    pub sync_version: i64,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// True while a local mutation has not been confirmed by the backend
    pub pending_sync: bool,
    pub fields: Map<String, Value>,
}

impl LocalRecord {
    /// Mirror a remote record, adopting its version.
    #[must_use]
    pub fn from_remote(remote: &RemoteRecord) -> Self {
        Self {
            id: remote.id,
            table: remote.table,
            sync_version: remote.sync_version,
            updated_at: remote.updated_at,
            deleted_at: remote.deleted_at,
            pending_sync: false,
            fields: remote.fields.clone(),
        }
    }

    /// A record created locally that the backend has never seen.
    #[must_use]
    pub const fn new_local(
        table: SyncTable,
        id: RecordId,
        fields: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            table,
            sync_version: 0,
            updated_at: now,
            deleted_at: None,
            pending_sync: true,
            fields,
        }
    }

    /// Replace every field with the remote state and clear the pending flag.
    pub fn overwrite_from(&mut self, remote: &RemoteRecord) {
        *self = Self::from_remote(remote);
    }

    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

fn parse_timestamp(
    field: &'static str,
    value: Option<Value>,
) -> Result<Option<DateTime<Utc>>, RecordDecodeError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => DateTime::parse_from_rfc3339(&raw)
            .map(|timestamp| Some(timestamp.with_timezone(&Utc)))
            .map_err(|_| RecordDecodeError::InvalidTimestamp { field, value: raw }),
        Some(other) => Err(RecordDecodeError::InvalidTimestamp {
            field,
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn row(version: Value) -> Value {
        json!({
            "id": "0190f2a4-7b1c-7cc1-9a52-3c1f7a9e0b11",
            "sync_version": version,
            "updated_at": "2026-03-01T12:00:00.123456+00:00",
            "deleted_at": null,
            "amount": -42.5,
            "user_id": "user-1"
        })
    }

    #[test]
    fn test_record_id_unique() {
        assert_ne!(RecordId::new(), RecordId::new());
    }

    #[test]
    fn test_record_id_parse() {
        let id = RecordId::new();
        let parsed: RecordId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn decodes_row_and_splits_sync_columns() {
        let record = RemoteRecord::from_row(SyncTable::Transactions, row(json!(7))).unwrap();

        assert_eq!(record.sync_version, 7);
        assert!(!record.is_deleted());
        assert_eq!(record.fields.len(), 2);
        assert_eq!(record.fields["amount"], json!(-42.5));
        assert!(!record.fields.contains_key("sync_version"));
        assert!(!record.fields.contains_key("updated_at"));
    }

    #[test]
    fn rejects_malformed_versions() {
        for version in [json!("7"), json!(-1), json!(1.5), Value::Null] {
            let error = RemoteRecord::from_row(SyncTable::Transactions, row(version)).unwrap_err();
            assert!(
                matches!(error, RecordDecodeError::InvalidVersion(_)),
                "unexpected error {error:?}"
            );
        }
    }

    #[test]
    fn rejects_rows_without_id() {
        let mut value = row(json!(1));
        value.as_object_mut().unwrap().remove("id");
        assert_eq!(
            RemoteRecord::from_row(SyncTable::Persons, value).unwrap_err(),
            RecordDecodeError::MissingField("id")
        );
        assert_eq!(
            RemoteRecord::from_row(SyncTable::Persons, json!([1, 2])).unwrap_err(),
            RecordDecodeError::NotAnObject
        );
    }

    #[test]
    fn decodes_soft_delete_marker() {
        let mut value = row(json!(5));
        value["deleted_at"] = json!("2026-03-02T08:00:00Z");
        let record = RemoteRecord::from_row(SyncTable::Transactions, value).unwrap();
        assert!(record.is_deleted());
    }

    #[test]
    fn overwrite_clears_pending_flag() {
        let remote = RemoteRecord::from_row(SyncTable::Transactions, row(json!(4))).unwrap();
        let mut local = LocalRecord::new_local(
            SyncTable::Transactions,
            remote.id,
            Map::new(),
            Utc::now(),
        );
        assert!(local.pending_sync);

        local.overwrite_from(&remote);
        assert_eq!(local, LocalRecord::from_remote(&remote));
        assert!(!local.pending_sync);
        assert_eq!(local.sync_version, 4);
    }
}
