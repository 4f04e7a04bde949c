//! Observable sync status.

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncProgress {
    #[default]
    Idle,
    Syncing {
        completed: usize,
        total: usize,
    },
    Completed,
    /// Finished with this many items lost. An aborted pull reports one
    /// failed batch.
    Failed(usize),
}

impl SyncProgress {
    /// Fraction complete in `0.0..=1.0` while syncing.
    pub fn fraction(&self) -> Option<f64> {
        match *self {
            Self::Syncing { total: 0, .. } => Some(0.0),
            #[allow(clippy::cast_precision_loss)]
            Self::Syncing { completed, total } => Some(completed as f64 / total as f64),
            _ => None,
        }
    }
}

/// Snapshot of everything a UI needs to render sync status.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncState {
    pub is_online: bool,
    pub is_syncing: bool,
    /// Watermark of the last successful pull
    pub last_sync_date: Option<DateTime<Utc>>,
    pub pending_changes_count: usize,
    pub sync_error: Option<SyncError>,
    pub sync_progress: SyncProgress,
}

/// Single writer for [`SyncState`]; every update is published to watchers.
#[derive(Debug)]
pub(crate) struct StateHandle {
    tx: watch::Sender<SyncState>,
}

impl StateHandle {
    pub(crate) fn new(initial: SyncState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub(crate) fn update(&self, modify: impl FnOnce(&mut SyncState)) {
        self.tx.send_modify(modify);
    }

    pub(crate) fn snapshot(&self) -> SyncState {
        self.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.tx.subscribe()
    }
}
