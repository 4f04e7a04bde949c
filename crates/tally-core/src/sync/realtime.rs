//! Applying server-pushed row changes.

use std::sync::{Arc, Weak};

use crate::backend::{RealtimeEventType, RealtimeMessage};
use crate::models::{RecordId, RemoteRecord, SyncTable};

use super::engine::{EngineInner, SyncEngine};
use super::notify::ChangeSource;
use super::reconcile::ReconcileOutcome;
use super::{SyncError, SyncResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    Applied(ReconcileOutcome),
    Removed,
    /// Nothing to do: unknown table, or a delete of a record never mirrored
    Ignored,
}

impl SyncEngine {
    /// Subscribe to every realtime table.
    pub async fn start_realtime(&self) -> SyncResult<()> {
        for table in SyncTable::REALTIME {
            self.subscribe_table(table).await?;
        }
        Ok(())
    }

    /// Open a subscription for `table`, replacing any existing one.
    pub async fn subscribe_table(&self, table: SyncTable) -> SyncResult<()> {
        let Some(session) = self.session().await else {
            return Err(SyncError::NotAuthenticated);
        };

        let mut subscriptions = self.inner.subscriptions.lock().await;
        if let Some(previous) = subscriptions.remove(&table) {
            previous.abort();
        }

        let mut stream = self
            .call(self.inner.backend.subscribe(table, &session))
            .await?;
        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            while let Some(message) = stream.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let engine = SyncEngine { inner };
                if let Err(error) = engine.apply_realtime_message(message).await {
                    tracing::warn!(%table, %error, "Dropped realtime delta");
                }
            }
            tracing::debug!(%table, "Realtime stream ended");
        });
        subscriptions.insert(table, task);
        tracing::info!(%table, "Subscribed to realtime changes");
        Ok(())
    }

    pub async fn unsubscribe_table(&self, table: SyncTable) {
        if let Some(task) = self.inner.subscriptions.lock().await.remove(&table) {
            task.abort();
        }
    }

    pub async fn stop_realtime(&self) {
        let mut subscriptions = self.inner.subscriptions.lock().await;
        for (_, task) in subscriptions.drain() {
            task.abort();
        }
    }

    pub async fn subscribed_tables(&self) -> Vec<SyncTable> {
        let subscriptions = self.inner.subscriptions.lock().await;
        SyncTable::FULL_SYNC_ORDER
            .into_iter()
            .filter(|table| {
                subscriptions
                    .get(table)
                    .is_some_and(|task| !task.is_finished())
            })
            .collect()
    }

    /// Apply one server-pushed change to the local store.
    ///
    /// Inserts and updates go through version reconciliation; deletes
    /// remove the local mirror outright.
    pub async fn apply_realtime_message(&self, message: RealtimeMessage) -> SyncResult<DeltaOutcome> {
        let Ok(table) = message.table.parse::<SyncTable>() else {
            tracing::debug!(table = %message.table, "Ignoring delta for unknown table");
            return Ok(DeltaOutcome::Ignored);
        };

        let outcome = match message.event_type {
            RealtimeEventType::Insert | RealtimeEventType::Update => {
                let row = message.new_record.ok_or_else(|| {
                    SyncError::InvalidPayload(format!(
                        "{:?} delta for {table} has no record",
                        message.event_type
                    ))
                })?;
                let remote = RemoteRecord::from_row(table, row)?;
                DeltaOutcome::Applied(self.inner.reconciler.apply(&remote).await?)
            }
            RealtimeEventType::Delete => {
                let id = message
                    .old_record
                    .as_ref()
                    .and_then(|record| record.get("id"))
                    .and_then(|id| id.as_str())
                    .and_then(|id| id.parse::<RecordId>().ok())
                    .ok_or_else(|| {
                        SyncError::InvalidPayload(format!("delete delta for {table} has no id"))
                    })?;
                if self.inner.reconciler.remove(table, id).await? {
                    DeltaOutcome::Removed
                } else {
                    DeltaOutcome::Ignored
                }
            }
        };

        let changed = match outcome {
            DeltaOutcome::Applied(outcome) => outcome.changed_local(),
            DeltaOutcome::Removed => true,
            DeltaOutcome::Ignored => false,
        };
        if changed {
            tracing::debug!(%table, ?outcome, "Applied realtime delta");
            self.inner
                .notifier
                .notify(vec![table], ChangeSource::Realtime);
        }
        Ok(outcome)
    }
}
