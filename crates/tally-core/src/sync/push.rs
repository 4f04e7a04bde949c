//! Draining the pending-change queue to the backend.

use serde_json::{json, Value};

use super::engine::SyncEngine;
use super::notify::ChangeSource;
use super::queue::DrainResolution;
use super::state::SyncProgress;
use super::{SyncError, SyncResult};
use crate::auth::AuthSession;
use crate::backend::BackendError;
use crate::models::{ChangeOperation, PendingChange, RemoteRecord, SyncTable};

/// Why a drain did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    NotAuthenticated,
    /// Another drain or a pull holds the sync gate
    AlreadySyncing,
    QueueEmpty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AbandonedChange {
    pub change: PendingChange,
    pub reason: SyncError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    /// Changes the backend accepted
    pub pushed: usize,
    /// Changes that failed and stay queued
    pub retried: usize,
    /// Changes dropped for good
    pub abandoned: Vec<AbandonedChange>,
}

impl DrainReport {
    pub fn hard_failures(&self) -> usize {
        self.abandoned.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrainOutcome {
    Skipped(SkipReason),
    Completed(DrainReport),
}

enum PushFailure {
    /// The change can never succeed
    Invalid(SyncError),
    /// The backend refused or was unreachable; worth retrying
    Remote(BackendError),
}

impl SyncEngine {
    /// Send every queued change to the backend, oldest first.
    ///
    /// A no-op when offline, signed out, already draining or empty. Each
    /// change is sent at most once per drain; a failure increments its retry
    /// count and never stops the rest of the batch. Changes reaching
    /// `max_retries` failures are dropped and reported as
    /// [`SyncError::PartialSyncFailure`] in the sync state.
    pub async fn sync_pending_changes(&self) -> SyncResult<DrainOutcome> {
        if !self.is_online() {
            return Ok(DrainOutcome::Skipped(SkipReason::Offline));
        }
        let Some(session) = self.session().await else {
            tracing::debug!("Skipping drain without a session");
            return Ok(DrainOutcome::Skipped(SkipReason::NotAuthenticated));
        };
        let Ok(_gate) = self.inner.sync_gate.try_lock() else {
            tracing::debug!("Drain already in progress");
            return Ok(DrainOutcome::Skipped(SkipReason::AlreadySyncing));
        };

        let batch = self.inner.queue.lock().await.snapshot();
        if batch.is_empty() {
            return Ok(DrainOutcome::Skipped(SkipReason::QueueEmpty));
        }

        let total = batch.len();
        let max_retries = self.inner.settings.max_retries;
        tracing::info!(total, "Pushing pending changes");
        self.begin_progress(total);

        let mut report = DrainReport::default();
        let mut resolution = DrainResolution::default();
        let mut confirmed: Vec<(SyncTable, Value)> = Vec::new();

        for (index, change) in batch.into_iter().enumerate() {
            match self.push_change(&session, &change).await {
                Ok(stored) => {
                    tracing::debug!(table = %change.table, id = %change.record_id, operation = %change.operation, "Pushed change");
                    report.pushed += 1;
                    resolution.removed.insert(change.id);
                    if let Some(row) = stored {
                        confirmed.push((change.table, row));
                    }
                }
                Err(PushFailure::Invalid(reason)) => {
                    tracing::error!(table = %change.table, id = %change.record_id, %reason, "Dropping unsendable change");
                    resolution.removed.insert(change.id);
                    report.abandoned.push(AbandonedChange { change, reason });
                }
                Err(PushFailure::Remote(error)) => {
                    let retry_count = change.retry_count.saturating_add(1);
                    if retry_count >= max_retries {
                        tracing::error!(
                            table = %change.table,
                            id = %change.record_id,
                            retry_count,
                            %error,
                            "Dropping change after exhausting retries"
                        );
                        resolution.removed.insert(change.id);
                        report.abandoned.push(AbandonedChange {
                            change,
                            reason: SyncError::SyncFailed(error.to_string()),
                        });
                    } else {
                        tracing::warn!(
                            table = %change.table,
                            id = %change.record_id,
                            retry_count,
                            %error,
                            "Push failed, will retry"
                        );
                        resolution.retried.insert(change.id, retry_count);
                        report.retried += 1;
                    }
                }
            }
            self.advance_progress(index + 1, total);
        }

        let (pending, persisted, still_queued) = {
            let mut queue = self.inner.queue.lock().await;
            queue.apply(&resolution);
            let persisted = self.inner.queue_file.save(&queue).await;
            let still_queued: Vec<bool> = confirmed
                .iter()
                .map(|(_, row)| {
                    row_record_id(row).is_some_and(|id| queue.contains_record(id))
                })
                .collect();
            (queue.len(), persisted, still_queued)
        };

        let mut touched = Vec::new();
        for ((table, row), queued) in confirmed.into_iter().zip(still_queued) {
            if queued {
                continue;
            }
            if self.confirm_push(table, row).await && !touched.contains(&table) {
                touched.push(table);
            }
        }

        let hard_failures = report.hard_failures();
        self.inner.state.update(|state| {
            state.is_syncing = false;
            state.pending_changes_count = pending;
            if hard_failures > 0 {
                state.sync_error = Some(SyncError::PartialSyncFailure(hard_failures));
                state.sync_progress = SyncProgress::Failed(hard_failures);
            } else {
                state.sync_progress = SyncProgress::Completed;
            }
        });
        self.inner.notifier.notify(touched, ChangeSource::Push);

        if let Err(error) = persisted {
            tracing::error!(%error, "Failed to persist queue after drain");
            return Err(self.fail(error));
        }

        tracing::info!(
            pushed = report.pushed,
            retried = report.retried,
            abandoned = hard_failures,
            "Drain finished"
        );
        Ok(DrainOutcome::Completed(report))
    }

    async fn push_change(
        &self,
        session: &AuthSession,
        change: &PendingChange,
    ) -> Result<Option<Value>, PushFailure> {
        let backend = &self.inner.backend;
        let result = match change.operation {
            ChangeOperation::Insert => {
                let mut body = object_payload(change)?;
                if let Some(object) = body.as_object_mut() {
                    object.insert("id".to_string(), json!(change.record_id.as_str()));
                }
                self.call(backend.insert(change.table, session, &body)).await
            }
            ChangeOperation::Update => {
                let body = object_payload(change)?;
                self.call(backend.update(change.table, session, change.record_id, &body))
                    .await
            }
            ChangeOperation::Delete => {
                self.call(backend.soft_delete(
                    change.table,
                    session,
                    change.record_id,
                    change.timestamp,
                ))
                .await
            }
        };
        result.map_err(PushFailure::Remote)
    }

    /// Fold the backend's stored row into the local mirror. Returns whether
    /// the mirror changed.
    async fn confirm_push(&self, table: SyncTable, row: Value) -> bool {
        let remote = match RemoteRecord::from_row(table, row) {
            Ok(remote) => remote,
            Err(error) => {
                tracing::warn!(%table, %error, "Backend returned an undecodable row");
                return false;
            }
        };
        match self.inner.reconciler.apply(&remote).await {
            Ok(outcome) => outcome.changed_local(),
            Err(error) => {
                tracing::warn!(%table, id = %remote.id, %error, "Failed to apply push confirmation");
                false
            }
        }
    }
}

fn object_payload(change: &PendingChange) -> Result<Value, PushFailure> {
    match &change.payload {
        Some(payload @ Value::Object(_)) => Ok(payload.clone()),
        Some(_) => Err(PushFailure::Invalid(SyncError::InvalidPayload(format!(
            "{} payload for {}/{} is not a JSON object",
            change.operation, change.table, change.record_id
        )))),
        None => Err(PushFailure::Invalid(SyncError::InvalidPayload(format!(
            "{} for {}/{} has no payload",
            change.operation, change.table, change.record_id
        )))),
    }
}

fn row_record_id(row: &Value) -> Option<crate::models::RecordId> {
    row.get("id")?.as_str()?.parse().ok()
}
