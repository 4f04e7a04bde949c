//! In-memory record store

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::db::RecordStore;
use crate::error::Result;
use crate::models::{LocalRecord, RecordId, SyncTable};

/// `HashMap`-backed `RecordStore` for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<(SyncTable, RecordId), LocalRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all tables
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn fetch(&self, table: SyncTable, id: RecordId) -> Result<Option<LocalRecord>> {
        Ok(self.records.read().await.get(&(table, id)).cloned())
    }

    async fn upsert(&self, record: &LocalRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert((record.table, record.id), record.clone());
        Ok(())
    }

    async fn delete(&self, table: SyncTable, id: RecordId) -> Result<bool> {
        Ok(self.records.write().await.remove(&(table, id)).is_some())
    }

    async fn list(&self, table: SyncTable) -> Result<Vec<LocalRecord>> {
        let mut records: Vec<LocalRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|record| record.table == table)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }
}
