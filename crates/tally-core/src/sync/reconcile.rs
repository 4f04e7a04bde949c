//! Version-based reconciliation of remote records into the local store.
//!
//! The rule is last-writer-wins on `sync_version`: a remote record replaces
//! the local mirror only when its version is strictly newer. Concurrent edits
//! that land on the same version are not merged.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::RecordStore;
use crate::error::Result;
use crate::models::{LocalRecord, RecordId, RemoteRecord, SyncTable};

/// What reconciling one remote record should do to the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    Insert(LocalRecord),
    Overwrite(LocalRecord),
    /// Local mirror is as new or newer
    KeepLocal,
    /// Remote is deleted and was never mirrored
    SkipDeleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Inserted,
    Overwritten,
    KeptLocal,
    SkippedDeleted,
}

impl ReconcileOutcome {
    pub const fn changed_local(self) -> bool {
        matches!(self, Self::Inserted | Self::Overwritten)
    }
}

/// Decide how `remote` applies to the current local mirror.
pub fn reconcile(local: Option<&LocalRecord>, remote: &RemoteRecord) -> Reconciliation {
    match local {
        None if remote.is_deleted() => Reconciliation::SkipDeleted,
        None => Reconciliation::Insert(LocalRecord::from_remote(remote)),
        Some(local) if remote.sync_version > local.sync_version => {
            let mut updated = local.clone();
            updated.overwrite_from(remote);
            Reconciliation::Overwrite(updated)
        }
        Some(_) => Reconciliation::KeepLocal,
    }
}

/// Applies reconciliation against a store.
///
/// Every read-compare-write runs under one lock, so a pull, a realtime delta
/// and a push confirmation for the same record cannot interleave.
pub(crate) struct Reconciler {
    store: Arc<dyn RecordStore>,
    lock: Mutex<()>,
}

impl Reconciler {
    pub(crate) fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub(crate) async fn apply(&self, remote: &RemoteRecord) -> Result<ReconcileOutcome> {
        let _guard = self.lock.lock().await;
        let local = self.store.fetch(remote.table, remote.id).await?;

        match reconcile(local.as_ref(), remote) {
            Reconciliation::Insert(record) => {
                self.store.upsert(&record).await?;
                Ok(ReconcileOutcome::Inserted)
            }
            Reconciliation::Overwrite(record) => {
                self.store.upsert(&record).await?;
                Ok(ReconcileOutcome::Overwritten)
            }
            Reconciliation::KeepLocal => Ok(ReconcileOutcome::KeptLocal),
            Reconciliation::SkipDeleted => Ok(ReconcileOutcome::SkippedDeleted),
        }
    }

    /// Drop the local mirror of a record hard-deleted on the server.
    pub(crate) async fn remove(&self, table: SyncTable, id: RecordId) -> Result<bool> {
        let _guard = self.lock.lock().await;
        self.store.delete(table, id).await
    }

    /// Write a local mutation, derived from the current mirror.
    pub(crate) async fn write_local<F>(&self, table: SyncTable, id: RecordId, build: F) -> Result<LocalRecord>
    where
        F: FnOnce(Option<LocalRecord>) -> LocalRecord + Send,
    {
        let _guard = self.lock.lock().await;
        let current = self.store.fetch(table, id).await?;
        let record = build(current);
        self.store.upsert(&record).await?;
        Ok(record)
    }
}
