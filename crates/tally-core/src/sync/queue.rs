//! Durable FIFO of local mutations awaiting push.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::durable::JsonFile;
use super::SyncResult;
use crate::models::{PendingChange, PendingChangeId, RecordId};

const QUEUE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct QueueDocument {
    version: u32,
    changes: Vec<PendingChange>,
}

/// What a drain decided for each entry of its snapshot.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct DrainResolution {
    /// Entries pushed successfully or abandoned
    pub(crate) removed: HashSet<PendingChangeId>,
    /// Entries kept for another attempt, with their new retry count
    pub(crate) retried: HashMap<PendingChangeId, u32>,
}

/// Ordered pending changes. Order is enqueue order and is never rearranged.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PendingChangeQueue {
    changes: Vec<PendingChange>,
}

impl PendingChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_changes(changes: Vec<PendingChange>) -> Self {
        Self { changes }
    }

    pub fn push(&mut self, change: PendingChange) {
        self.changes.push(change);
    }

    /// Remove the most recently pushed entry if it has the given id.
    pub(crate) fn pop_if(&mut self, id: PendingChangeId) -> Option<PendingChange> {
        if self.changes.last().is_some_and(|last| last.id == id) {
            self.changes.pop()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn changes(&self) -> &[PendingChange] {
        &self.changes
    }

    pub fn snapshot(&self) -> Vec<PendingChange> {
        self.changes.clone()
    }

    pub fn contains_record(&self, record_id: RecordId) -> bool {
        self.changes
            .iter()
            .any(|change| change.record_id == record_id)
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }

    /// Apply a drain's decisions. Entries enqueued after the drain took its
    /// snapshot are not mentioned in `resolution` and stay where they are.
    pub(crate) fn apply(&mut self, resolution: &DrainResolution) {
        self.changes
            .retain(|change| !resolution.removed.contains(&change.id));
        for change in &mut self.changes {
            if let Some(retry_count) = resolution.retried.get(&change.id) {
                change.retry_count = *retry_count;
            }
        }
    }
}

/// On-disk home of the queue.
#[derive(Debug, Clone)]
pub(crate) struct QueueFile {
    file: JsonFile,
}

impl QueueFile {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    pub(crate) async fn load(&self) -> SyncResult<PendingChangeQueue> {
        let document: Option<QueueDocument> = self.file.load().await?;
        Ok(document.map_or_else(PendingChangeQueue::new, |document| {
            PendingChangeQueue::from_changes(document.changes)
        }))
    }

    pub(crate) async fn save(&self, queue: &PendingChangeQueue) -> SyncResult<()> {
        let document = QueueDocument {
            version: QUEUE_FORMAT_VERSION,
            changes: queue.snapshot(),
        };
        self.file.save(&document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncTable;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn change(table: SyncTable) -> PendingChange {
        PendingChange::insert(table, RecordId::new(), json!({"name": "Ana"}), Utc::now())
    }

    #[test]
    fn apply_keeps_order_and_new_entries() {
        let first = change(SyncTable::Persons);
        let second = change(SyncTable::Expenses);
        let third = change(SyncTable::Settlements);
        let late = change(SyncTable::Transactions);
        let mut queue =
            PendingChangeQueue::from_changes(vec![first.clone(), second.clone(), third.clone()]);
        queue.push(late.clone());

        let mut resolution = DrainResolution::default();
        resolution.removed.insert(second.id);
        resolution.retried.insert(first.id, 1);
        resolution.retried.insert(third.id, 2);
        queue.apply(&resolution);

        let ids: Vec<_> = queue.changes().iter().map(|change| change.id).collect();
        assert_eq!(ids, vec![first.id, third.id, late.id]);
        assert_eq!(queue.changes()[0].retry_count, 1);
        assert_eq!(queue.changes()[1].retry_count, 2);
        assert_eq!(queue.changes()[2].retry_count, 0);
    }

    #[test]
    fn pop_if_only_removes_matching_tail() {
        let first = change(SyncTable::Persons);
        let second = change(SyncTable::Persons);
        let mut queue = PendingChangeQueue::from_changes(vec![first.clone(), second.clone()]);

        assert!(queue.pop_if(first.id).is_none());
        assert_eq!(queue.pop_if(second.id), Some(second));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn contains_record() {
        let first = change(SyncTable::Persons);
        let queue = PendingChangeQueue::from_changes(vec![first.clone()]);
        assert!(queue.contains_record(first.record_id));
        assert!(!queue.contains_record(RecordId::new()));
    }

    #[tokio::test]
    async fn file_round_trip_preserves_order_and_retries() {
        let temp = TempDir::new().unwrap();
        let file = QueueFile::new(temp.path().join("pending_changes.json"));
        assert!(file.load().await.unwrap().is_empty());

        let mut retried = change(SyncTable::Expenses);
        retried.retry_count = 2;
        let delete = PendingChange::delete(SyncTable::Persons, RecordId::new(), Utc::now());
        let queue = PendingChangeQueue::from_changes(vec![retried, delete]);
        file.save(&queue).await.unwrap();

        assert_eq!(file.load().await.unwrap(), queue);
    }
}
