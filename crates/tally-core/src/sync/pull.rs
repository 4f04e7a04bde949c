//! Pulling remote state into the local store.

use crate::backend::SelectFilter;
use crate::models::{RemoteRecord, SyncTable};

use super::engine::SyncEngine;
use super::notify::ChangeSource;
use super::reconcile::ReconcileOutcome;
use super::state::SyncProgress;
use super::{SyncError, SyncResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullKind {
    /// Every table, in dependency order, ignoring the watermark
    Full,
    /// Rows modified after the watermark, deletions included
    Incremental,
}

impl PullKind {
    pub const fn tables(self) -> &'static [SyncTable] {
        match self {
            Self::Full => &SyncTable::FULL_SYNC_ORDER,
            Self::Incremental => &SyncTable::INCREMENTAL,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    pub fetched: usize,
    pub inserted: usize,
    pub overwritten: usize,
    pub unchanged: usize,
    /// Rows that could not be decoded or compared
    pub skipped: usize,
    /// Tables whose local mirror changed
    pub changed_tables: Vec<SyncTable>,
}

impl PullReport {
    fn record(&mut self, table: SyncTable, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Inserted => self.inserted += 1,
            ReconcileOutcome::Overwritten => self.overwritten += 1,
            ReconcileOutcome::KeptLocal | ReconcileOutcome::SkippedDeleted => self.unchanged += 1,
        }
        if outcome.changed_local() && !self.changed_tables.contains(&table) {
            self.changed_tables.push(table);
        }
    }
}

impl SyncEngine {
    /// Fetch every table from scratch and reconcile it locally.
    pub async fn full_sync(&self) -> SyncResult<PullReport> {
        self.pull(PullKind::Full).await
    }

    /// Fetch rows changed since the last successful pull.
    ///
    /// Without a watermark this fetches everything in the incremental tables.
    pub async fn incremental_sync(&self) -> SyncResult<PullReport> {
        self.pull(PullKind::Incremental).await
    }

    /// Run a pull. The first failing table aborts it and leaves the
    /// watermark untouched; rows already reconciled stay applied.
    pub async fn pull(&self, kind: PullKind) -> SyncResult<PullReport> {
        if !self.is_online() {
            return Err(self.reject(SyncError::Offline));
        }
        let Some(session) = self.session().await else {
            return Err(self.reject(SyncError::NotAuthenticated));
        };

        let _gate = self.inner.sync_gate.lock().await;
        let started_at = self.inner.clock.now();
        let filter = match kind {
            PullKind::Full => SelectFilter {
                updated_after: None,
                include_deleted: self.inner.settings.full_sync_include_deleted,
            },
            PullKind::Incremental => match self.last_sync_date() {
                Some(watermark) => SelectFilter::modified_since(watermark),
                None => SelectFilter {
                    updated_after: None,
                    include_deleted: true,
                },
            },
        };

        let tables = kind.tables();
        tracing::info!(?kind, since = ?filter.updated_after, "Pulling remote changes");
        self.begin_progress(tables.len());

        let mut report = PullReport::default();
        for (index, &table) in tables.iter().enumerate() {
            let rows = match self
                .call(self.inner.backend.select(table, &session, &filter))
                .await
            {
                Ok(rows) => rows,
                Err(error) => {
                    self.inner
                        .notifier
                        .notify(report.changed_tables.clone(), ChangeSource::Pull);
                    return Err(self.fail(SyncError::SyncFailed(format!("{table}: {error}"))));
                }
            };

            report.fetched += rows.len();
            for row in rows {
                let remote = match RemoteRecord::from_row(table, row) {
                    Ok(remote) => remote,
                    Err(error) => {
                        let error = SyncError::from(error);
                        tracing::warn!(%table, %error, "Skipping remote row");
                        report.skipped += 1;
                        continue;
                    }
                };
                match self.inner.reconciler.apply(&remote).await {
                    Ok(outcome) => report.record(table, outcome),
                    Err(error) => {
                        self.inner
                            .notifier
                            .notify(report.changed_tables.clone(), ChangeSource::Pull);
                        return Err(self.fail(SyncError::from(error)));
                    }
                }
            }
            self.advance_progress(index + 1, tables.len());
        }

        if let Err(error) = self.inner.watermark_file.save(started_at).await {
            tracing::warn!(%error, "Failed to persist sync watermark");
        }
        self.inner.state.update(|state| {
            state.is_syncing = false;
            state.last_sync_date = Some(started_at);
            state.sync_progress = SyncProgress::Completed;
        });
        self.inner
            .notifier
            .notify(report.changed_tables.clone(), ChangeSource::Pull);

        tracing::info!(
            ?kind,
            fetched = report.fetched,
            inserted = report.inserted,
            overwritten = report.overwritten,
            skipped = report.skipped,
            "Pull finished"
        );
        Ok(report)
    }
}
