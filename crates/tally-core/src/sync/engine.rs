//! The sync engine: one instance per signed-in process.
//!
//! Owns the durable queue, the watermark, connectivity and the observable
//! state. Push, pull and realtime live in their own modules as further
//! `impl SyncEngine` blocks.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use super::clock::{Clock, SystemClock};
use super::network::{NetworkMonitor, PathTransition};
use super::notify::{ChangeNotifier, DataChanged};
use super::queue::{PendingChangeQueue, QueueFile};
use super::reconcile::Reconciler;
use super::state::{StateHandle, SyncProgress, SyncState};
use super::watermark::WatermarkFile;
use super::{SyncError, SyncResult};
use crate::auth::AuthSession;
use crate::backend::{BackendError, BackendResult, RemoteBackend};
use crate::config::SyncSettings;
use crate::db::RecordStore;
use crate::models::{ChangeOperation, LocalRecord, PendingChange, RecordId, SyncTable};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

pub(crate) struct EngineInner {
    pub(crate) settings: SyncSettings,
    pub(crate) backend: Arc<dyn RemoteBackend>,
    pub(crate) reconciler: Reconciler,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) queue: Mutex<PendingChangeQueue>,
    pub(crate) queue_file: QueueFile,
    pub(crate) watermark_file: WatermarkFile,
    pub(crate) state: StateHandle,
    pub(crate) network: NetworkMonitor,
    pub(crate) notifier: ChangeNotifier,
    pub(crate) session: RwLock<Option<AuthSession>>,
    /// Held for the whole of a drain or pull
    pub(crate) sync_gate: Mutex<()>,
    pub(crate) subscriptions: Mutex<HashMap<SyncTable, JoinHandle<()>>>,
}

/// Cheaply cloneable handle to a running engine.
#[derive(Clone)]
pub struct SyncEngine {
    pub(crate) inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Restore the queue and watermark from `settings.data_dir` and build an
    /// engine that starts offline and signed out.
    pub async fn load(
        settings: SyncSettings,
        store: Arc<dyn RecordStore>,
        backend: Arc<dyn RemoteBackend>,
    ) -> SyncResult<Self> {
        Self::load_with_clock(settings, store, backend, Arc::new(SystemClock)).await
    }

    pub async fn load_with_clock(
        settings: SyncSettings,
        store: Arc<dyn RecordStore>,
        backend: Arc<dyn RemoteBackend>,
        clock: Arc<dyn Clock>,
    ) -> SyncResult<Self> {
        let queue_file = QueueFile::new(settings.queue_path());
        let watermark_file = WatermarkFile::new(settings.watermark_path());
        let queue = queue_file.load().await?;
        let last_sync_date = watermark_file.load().await?;

        tracing::debug!(
            pending = queue.len(),
            ?last_sync_date,
            data_dir = %settings.data_dir.display(),
            "Loaded sync state"
        );

        let state = StateHandle::new(SyncState {
            pending_changes_count: queue.len(),
            last_sync_date,
            ..SyncState::default()
        });

        Ok(Self {
            inner: Arc::new(EngineInner {
                settings,
                backend,
                reconciler: Reconciler::new(store),
                clock,
                queue: Mutex::new(queue),
                queue_file,
                watermark_file,
                state,
                network: NetworkMonitor::new(false),
                notifier: ChangeNotifier::new(CHANGE_CHANNEL_CAPACITY),
                session: RwLock::new(None),
                sync_gate: Mutex::new(()),
                subscriptions: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        self.inner.reconciler.store()
    }

    pub fn state(&self) -> SyncState {
        self.inner.state.snapshot()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<DataChanged> {
        self.inner.notifier.subscribe()
    }

    pub fn is_online(&self) -> bool {
        self.inner.network.is_online()
    }

    pub fn last_sync_date(&self) -> Option<DateTime<Utc>> {
        self.inner.state.snapshot().last_sync_date
    }

    pub async fn pending_changes(&self) -> Vec<PendingChange> {
        self.inner.queue.lock().await.snapshot()
    }

    pub async fn set_session(&self, session: Option<AuthSession>) {
        *self.inner.session.write().await = session;
    }

    pub(crate) async fn session(&self) -> Option<AuthSession> {
        self.inner.session.read().await.clone()
    }

    /// Report a connectivity change from the platform.
    ///
    /// On an offline-to-online edge with queued work, drains the queue once
    /// before returning. Never fails; drain problems land in [`SyncState`].
    pub async fn handle_path_change(&self, online: bool) {
        let transition = self.inner.network.record(online);
        self.inner.state.update(|state| state.is_online = online);

        match transition {
            PathTransition::CameOnline => {
                tracing::info!("Network available");
                let pending = self.inner.queue.lock().await.len();
                if pending > 0 {
                    if let Err(error) = self.sync_pending_changes().await {
                        tracing::warn!(%error, "Drain after reconnect failed");
                    }
                }
            }
            PathTransition::WentOffline => tracing::info!("Network lost"),
            PathTransition::Unchanged => {}
        }
    }

    /// Feed connectivity from a watch channel until it closes.
    pub fn spawn_network_listener(&self, mut rx: watch::Receiver<bool>) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let initial = *rx.borrow_and_update();
            engine.handle_path_change(initial).await;
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                engine.handle_path_change(online).await;
            }
        })
    }

    /// Persist a change to the durable queue.
    ///
    /// The change is on disk before this returns. While online (and unless
    /// disabled in settings) a drain is started in the background.
    pub async fn enqueue(&self, change: PendingChange) -> SyncResult<()> {
        let pending = {
            let mut queue = self.inner.queue.lock().await;
            self.persist_change(&mut queue, change).await?;
            queue.len()
        };
        self.queued(pending);
        Ok(())
    }

    /// Append to the queue and save it, undoing the append if the save fails.
    async fn persist_change(
        &self,
        queue: &mut PendingChangeQueue,
        change: PendingChange,
    ) -> SyncResult<()> {
        let change_id = change.id;
        queue.push(change);
        if let Err(error) = self.inner.queue_file.save(queue).await {
            queue.pop_if(change_id);
            tracing::error!(%error, "Failed to persist pending change");
            return Err(error);
        }
        Ok(())
    }

    fn queued(&self, pending: usize) {
        self.inner
            .state
            .update(|state| state.pending_changes_count = pending);

        if self.inner.settings.drain_on_enqueue && self.is_online() {
            let engine = self.clone();
            tokio::spawn(async move {
                if let Err(error) = engine.sync_pending_changes().await {
                    tracing::warn!(%error, "Background drain failed");
                }
            });
        }
    }

    /// Apply a local mutation to the store and queue it for the backend.
    ///
    /// Inserts replace the record body; updates merge `payload` into it;
    /// deletes mark the record deleted locally. The mirror keeps its
    /// last confirmed version and is flagged `pending_sync`.
    pub async fn record_local_change(
        &self,
        table: SyncTable,
        id: RecordId,
        operation: ChangeOperation,
        payload: Option<Value>,
    ) -> SyncResult<PendingChange> {
        let now = self.inner.clock.now();
        let fields = match (operation, payload.as_ref()) {
            (ChangeOperation::Delete, _) => None,
            (_, Some(Value::Object(fields))) => Some(fields.clone()),
            (_, Some(_)) => {
                return Err(SyncError::InvalidPayload(format!(
                    "{operation} payload for {table}/{id} must be a JSON object"
                )))
            }
            (_, None) => {
                return Err(SyncError::InvalidPayload(format!(
                    "{operation} for {table}/{id} requires a payload"
                )))
            }
        };

        let change = PendingChange::new(table, id, operation, payload, now);
        // Queue first: a mirror flagged pending must always have an entry behind it
        let pending = {
            let mut queue = self.inner.queue.lock().await;
            self.persist_change(&mut queue, change.clone()).await?;

            let written = self
                .inner
                .reconciler
                .write_local(table, id, |current| {
                    apply_local_mutation(current, table, id, operation, fields, now)
                })
                .await;
            if let Err(error) = written {
                tracing::error!(%table, %id, %error, "Failed to write local change");
                queue.pop_if(change.id);
                if let Err(error) = self.inner.queue_file.save(&queue).await {
                    tracing::error!(%error, "Failed to withdraw pending change");
                }
                return Err(error.into());
            }
            queue.len()
        };
        self.queued(pending);
        tracing::debug!(%table, %id, %operation, "Recorded local change");
        Ok(change)
    }

    /// Forget everything tied to the current user.
    ///
    /// Stops realtime, clears the session, the queue and the watermark.
    /// The local record store is left to the caller.
    pub async fn reset(&self) -> SyncResult<()> {
        self.stop_realtime().await;
        self.set_session(None).await;

        let _gate = self.inner.sync_gate.lock().await;
        {
            let mut queue = self.inner.queue.lock().await;
            queue.clear();
            self.inner.queue_file.save(&queue).await?;
        }
        self.inner.watermark_file.clear().await?;

        let online = self.is_online();
        self.inner.state.update(|state| {
            *state = SyncState {
                is_online: online,
                ..SyncState::default()
            };
        });
        tracing::info!("Sync state reset");
        Ok(())
    }

    /// Run one backend call under the per-request timeout.
    pub(crate) async fn call<T, F>(&self, future: F) -> BackendResult<T>
    where
        F: Future<Output = BackendResult<T>>,
    {
        let timeout = self.inner.settings.request_timeout;
        tokio::time::timeout(timeout, future)
            .await
            .unwrap_or(Err(BackendError::Timeout(timeout)))
    }

    pub(crate) fn begin_progress(&self, total: usize) {
        self.inner.state.update(|state| {
            state.is_syncing = true;
            state.sync_error = None;
            state.sync_progress = SyncProgress::Syncing {
                completed: 0,
                total,
            };
        });
    }

    pub(crate) fn advance_progress(&self, completed: usize, total: usize) {
        self.inner.state.update(|state| {
            state.sync_progress = SyncProgress::Syncing { completed, total };
        });
    }

    /// Publish the end of an aborted run. Only call while holding the sync gate.
    pub(crate) fn fail(&self, error: SyncError) -> SyncError {
        tracing::warn!(%error, "Sync failed");
        let reported = error.clone();
        self.inner.state.update(|state| {
            state.is_syncing = false;
            state.sync_error = Some(reported);
            state.sync_progress = SyncProgress::Failed(1);
        });
        error
    }

    /// Report a run refused before it started. Leaves progress to whichever
    /// run holds the gate.
    pub(crate) fn reject(&self, error: SyncError) -> SyncError {
        tracing::debug!(%error, "Sync refused");
        let reported = error.clone();
        self.inner
            .state
            .update(|state| state.sync_error = Some(reported));
        error
    }
}

fn apply_local_mutation(
    current: Option<LocalRecord>,
    table: SyncTable,
    id: RecordId,
    operation: ChangeOperation,
    fields: Option<Map<String, Value>>,
    now: DateTime<Utc>,
) -> LocalRecord {
    let mut record = current.unwrap_or_else(|| LocalRecord::new_local(table, id, Map::new(), now));
    match (operation, fields) {
        (ChangeOperation::Insert, Some(fields)) => {
            record.fields = fields;
            record.deleted_at = None;
        }
        (ChangeOperation::Update, Some(fields)) => record.fields.extend(fields),
        (ChangeOperation::Delete, _) => record.deleted_at = Some(now),
        _ => {}
    }
    record.updated_at = now;
    record.pending_sync = true;
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Option<Map<String, Value>> {
        value.as_object().cloned()
    }

    #[test]
    fn update_merges_into_existing_fields() {
        let now = Utc::now();
        let id = RecordId::new();
        let mut existing = LocalRecord::new_local(
            SyncTable::Transactions,
            id,
            fields(json!({"amount": -10.0, "note": "coffee"})).unwrap_or_default(),
            now,
        );
        existing.sync_version = 4;
        existing.pending_sync = false;

        let updated = apply_local_mutation(
            Some(existing),
            SyncTable::Transactions,
            id,
            ChangeOperation::Update,
            fields(json!({"amount": -42.5})),
            now,
        );
        assert_eq!(updated.sync_version, 4);
        assert!(updated.pending_sync);
        assert_eq!(updated.fields["amount"], json!(-42.5));
        assert_eq!(updated.fields["note"], json!("coffee"));
    }

    #[test]
    fn delete_marks_record_without_dropping_it() {
        let now = Utc::now();
        let id = RecordId::new();
        let deleted = apply_local_mutation(
            None,
            SyncTable::Persons,
            id,
            ChangeOperation::Delete,
            None,
            now,
        );
        assert_eq!(deleted.deleted_at, Some(now));
        assert_eq!(deleted.sync_version, 0);
        assert!(deleted.pending_sync);
    }
}
