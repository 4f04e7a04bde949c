//! Offline-first synchronization with the hosted backend.
//!
//! Local mutations are written to the record store and appended to a durable
//! queue; [`SyncEngine::sync_pending_changes`] drains that queue when online.
//! Remote state arrives through full or incremental pulls and realtime
//! deltas, all reconciled by record version.

mod clock;
mod durable;
mod engine;
mod error;
mod network;
mod notify;
mod pull;
mod push;
mod queue;
mod realtime;
mod reconcile;
mod state;
mod watermark;

pub use crate::config::SyncSettings;
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use network::HttpReachabilityProbe;
pub use notify::{ChangeSource, DataChanged};
pub use pull::{PullKind, PullReport};
pub use push::{AbandonedChange, DrainOutcome, DrainReport, SkipReason};
pub use queue::PendingChangeQueue;
pub use realtime::DeltaOutcome;
pub use reconcile::{reconcile, ReconcileOutcome, Reconciliation};
pub use state::{SyncProgress, SyncState};
