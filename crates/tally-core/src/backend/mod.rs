//! Hosted backend abstraction.
//!
//! The sync engine talks to the backend only through [`RemoteBackend`], so the
//! Supabase client can be swapped for [`mock::MockBackend`] in tests.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::auth::AuthSession;
use crate::models::{RecordId, SyncTable};

pub mod mock;
mod realtime;
mod supabase;

pub use realtime::decode_frame;
pub use supabase::SupabaseBackend;

/// Row filter for `select`. Rows are always scoped to the session's user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectFilter {
    /// Only rows whose `updated_at` is strictly after this instant
    pub updated_after: Option<DateTime<Utc>>,
    /// Whether soft-deleted rows are returned
    pub include_deleted: bool,
}

impl SelectFilter {
    pub const fn all() -> Self {
        Self {
            updated_after: None,
            include_deleted: false,
        }
    }

    pub const fn modified_since(watermark: DateTime<Utc>) -> Self {
        Self {
            updated_after: Some(watermark),
            include_deleted: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RealtimeEventType {
    Insert,
    Update,
    Delete,
}

/// A row-level change pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeMessage {
    pub table: String,
    pub event_type: RealtimeEventType,
    pub new_record: Option<Value>,
    pub old_record: Option<Value>,
}

/// Messages for one table subscription. Dropping the receiver unsubscribes.
pub type DeltaStream = mpsc::Receiver<RealtimeMessage>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Backend API error: {0}")]
    Api(String),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Row not found: {0}")]
    NotFound(String),
    #[error("Realtime error: {0}")]
    Realtime(String),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Table operations offered by the hosted backend.
///
/// Write operations return the row as stored by the server (including its new
/// `sync_version`) when the backend provides it.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn select(
        &self,
        table: SyncTable,
        session: &AuthSession,
        filter: &SelectFilter,
    ) -> BackendResult<Vec<Value>>;

    async fn insert(
        &self,
        table: SyncTable,
        session: &AuthSession,
        record: &Value,
    ) -> BackendResult<Option<Value>>;

    async fn update(
        &self,
        table: SyncTable,
        session: &AuthSession,
        id: RecordId,
        record: &Value,
    ) -> BackendResult<Option<Value>>;

    /// Set the row's deletion timestamp. Rows are never hard-deleted by sync.
    async fn soft_delete(
        &self,
        table: SyncTable,
        session: &AuthSession,
        id: RecordId,
        deleted_at: DateTime<Utc>,
    ) -> BackendResult<Option<Value>>;

    async fn subscribe(&self, table: SyncTable, session: &AuthSession)
        -> BackendResult<DeltaStream>;
}

/// Stand-in when no backend is configured. Every call fails with
/// [`BackendError::Unavailable`], so local-only work still goes through the
/// engine and queued changes wait for a real backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisconnectedBackend;

impl DisconnectedBackend {
    fn unavailable<T>() -> BackendResult<T> {
        Err(BackendError::Unavailable("no backend configured".to_string()))
    }
}

#[async_trait]
impl RemoteBackend for DisconnectedBackend {
    async fn select(
        &self,
        _table: SyncTable,
        _session: &AuthSession,
        _filter: &SelectFilter,
    ) -> BackendResult<Vec<Value>> {
        Self::unavailable()
    }

    async fn insert(
        &self,
        _table: SyncTable,
        _session: &AuthSession,
        _record: &Value,
    ) -> BackendResult<Option<Value>> {
        Self::unavailable()
    }

    async fn update(
        &self,
        _table: SyncTable,
        _session: &AuthSession,
        _id: RecordId,
        _record: &Value,
    ) -> BackendResult<Option<Value>> {
        Self::unavailable()
    }

    async fn soft_delete(
        &self,
        _table: SyncTable,
        _session: &AuthSession,
        _id: RecordId,
        _deleted_at: DateTime<Utc>,
    ) -> BackendResult<Option<Value>> {
        Self::unavailable()
    }

    async fn subscribe(
        &self,
        _table: SyncTable,
        _session: &AuthSession,
    ) -> BackendResult<DeltaStream> {
        Self::unavailable()
    }
}
