//! Local record store implementations

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::Value;
use serde_json::{Map, Value as JsonValue};
use tokio::sync::Mutex;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{LocalRecord, RecordId, SyncTable};

/// Local persistence engine consumed by the sync layer.
///
/// Keyed by `(table, id)`. The sync layer only reads and writes whole
/// records; it never manages on-disk layout.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a record by id, including soft-deleted ones
    async fn fetch(&self, table: SyncTable, id: RecordId) -> Result<Option<LocalRecord>>;

    /// Insert or replace a record
    async fn upsert(&self, record: &LocalRecord) -> Result<()>;

    /// Physically remove a record. Returns whether a row existed.
    async fn delete(&self, table: SyncTable, id: RecordId) -> Result<bool>;

    /// List every record of a table, newest first
    async fn list(&self, table: SyncTable) -> Result<Vec<LocalRecord>>;
}

/// libSQL implementation of `RecordStore`
#[derive(Clone)]
pub struct LibSqlRecordStore {
    db: Arc<Mutex<Database>>,
}

impl LibSqlRecordStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Open a store at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self::new(Database::open(&db_path).await?))
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory().await?))
    }

    /// Parse a record from a `SELECT table_name, id, body, sync_version,
    /// pending_sync, updated_at, deleted_at` row
    fn parse_record(row: &libsql::Row) -> Result<LocalRecord> {
        let table: String = row.get(0)?;
        let id: String = row.get(1)?;
        let body: String = row.get(2)?;
        let updated_at: String = row.get(5)?;
        let deleted_at = match row.get_value(6)? {
            Value::Text(raw) => Some(parse_timestamp(&raw)?),
            _ => None,
        };

        let fields = match serde_json::from_str::<JsonValue>(&body)? {
            JsonValue::Object(fields) => fields,
            _ => Map::new(),
        };

        Ok(LocalRecord {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid record id in store: {id}")))?,
            table: table
                .parse()
                .map_err(|error| Error::Database(format!("{error}")))?,
            sync_version: row.get(3)?,
            pending_sync: row.get::<i64>(4)? != 0,
            updated_at: parse_timestamp(&updated_at)?,
            deleted_at,
            fields,
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT table_name, id, body, sync_version, pending_sync, updated_at, deleted_at FROM records";

#[async_trait]
impl RecordStore for LibSqlRecordStore {
    async fn fetch(&self, table: SyncTable, id: RecordId) -> Result<Option<LocalRecord>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                &format!("{SELECT_COLUMNS} WHERE table_name = ? AND id = ?"),
                libsql::params![table.as_str().to_string(), id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, record: &LocalRecord) -> Result<()> {
        let body = serde_json::to_string(&record.fields)?;
        let deleted_at = record
            .deleted_at
            .map_or(Value::Null, |deleted_at| Value::Text(format_timestamp(deleted_at)));

        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT INTO records (table_name, id, body, sync_version, pending_sync, updated_at, deleted_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (table_name, id) DO UPDATE SET
                    body = excluded.body,
                    sync_version = excluded.sync_version,
                    pending_sync = excluded.pending_sync,
                    updated_at = excluded.updated_at,
                    deleted_at = excluded.deleted_at",
                libsql::params![
                    record.table.as_str().to_string(),
                    record.id.as_str(),
                    body,
                    record.sync_version,
                    i64::from(record.pending_sync),
                    format_timestamp(record.updated_at),
                    deleted_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, table: SyncTable, id: RecordId) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db
            .connection()
            .execute(
                "DELETE FROM records WHERE table_name = ? AND id = ?",
                libsql::params![table.as_str().to_string(), id.as_str()],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn list(&self, table: SyncTable) -> Result<Vec<LocalRecord>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                &format!("{SELECT_COLUMNS} WHERE table_name = ? ORDER BY updated_at DESC"),
                libsql::params![table.as_str().to_string()],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| Error::Database(format!("invalid timestamp '{raw}' in store: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup() -> LibSqlRecordStore {
        LibSqlRecordStore::open_in_memory().await.unwrap()
    }

    fn record(table: SyncTable, version: i64) -> LocalRecord {
        let fields = json!({"amount": -42.5, "note": "lunch"})
            .as_object()
            .cloned()
            .unwrap();
        LocalRecord {
            id: RecordId::new(),
            table,
            sync_version: version,
            updated_at: DateTime::parse_from_rfc3339("2026-03-01T12:00:00.123456Z")
                .unwrap()
                .with_timezone(&Utc),
            deleted_at: None,
            pending_sync: false,
            fields,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upsert_and_fetch() {
        let store = setup().await;
        let record = record(SyncTable::Transactions, 3);

        store.upsert(&record).await.unwrap();
        let fetched = store
            .fetch(SyncTable::Transactions, record.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_is_scoped_by_table() {
        let store = setup().await;
        let record = record(SyncTable::Transactions, 1);
        store.upsert(&record).await.unwrap();

        assert!(store
            .fetch(SyncTable::Expenses, record.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upsert_replaces_existing_row() {
        let store = setup().await;
        let mut record = record(SyncTable::Persons, 1);
        store.upsert(&record).await.unwrap();

        record.sync_version = 5;
        record.pending_sync = true;
        record.deleted_at = Some(Utc::now());
        record.fields.insert("name".to_string(), json!("Ana"));
        store.upsert(&record).await.unwrap();

        let all = store.list(SyncTable::Persons).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].sync_version, 5);
        assert!(all[0].pending_sync);
        assert!(all[0].is_deleted());
        assert_eq!(all[0].fields["name"], json!("Ana"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete() {
        let store = setup().await;
        let record = record(SyncTable::Expenses, 2);
        store.upsert(&record).await.unwrap();

        assert!(store.delete(SyncTable::Expenses, record.id).await.unwrap());
        assert!(!store.delete(SyncTable::Expenses, record.id).await.unwrap());
        assert!(store
            .fetch(SyncTable::Expenses, record.id)
            .await
            .unwrap()
            .is_none());
    }
}
