//! tally-core - Core library for Tally
//!
//! This crate contains the synchronized record models, the local record
//! store, the hosted backend client, and the offline-first sync engine used
//! by every Tally interface.

pub mod auth;
pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{ChangeOperation, LocalRecord, PendingChange, RecordId, RemoteRecord, SyncTable};
pub use sync::{SyncEngine, SyncError, SyncState};
