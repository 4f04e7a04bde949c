//! Sync error types.

use thiserror::Error;

use crate::backend::BackendError;
use crate::models::RecordDecodeError;

/// Errors surfaced by the sync engine.
///
/// `Clone` so the last error can live in the published [`SyncState`].
///
/// [`SyncState`]: super::SyncState
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// No network path; nothing was attempted.
    #[error("offline")]
    Offline,

    /// No signed-in user.
    #[error("not authenticated")]
    NotAuthenticated,

    /// A queued change could not be encoded for the backend.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Queued changes were abandoned after exhausting their retries.
    #[error("{0} pending change(s) could not be synced and were dropped")]
    PartialSyncFailure(usize),

    /// A pull or backend call failed.
    #[error("sync failed: {0}")]
    SyncFailed(String),

    /// A remote record could not be compared against its local mirror.
    #[error("conflict resolution failed: {0}")]
    ConflictResolutionFailed(String),

    /// The local store or a durable sync file failed.
    #[error("local storage error: {0}")]
    Storage(String),
}

impl SyncError {
    /// Transient failures that a later attempt can fix without data loss.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Offline | Self::SyncFailed(_))
    }

    /// Failures where local changes were discarded.
    pub const fn lost_changes(&self) -> bool {
        matches!(self, Self::PartialSyncFailure(_) | Self::InvalidPayload(_))
    }
}

impl From<crate::Error> for SyncError {
    fn from(error: crate::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(error: std::io::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<BackendError> for SyncError {
    fn from(error: BackendError) -> Self {
        Self::SyncFailed(error.to_string())
    }
}

impl From<RecordDecodeError> for SyncError {
    fn from(error: RecordDecodeError) -> Self {
        match error {
            RecordDecodeError::InvalidVersion(_) => Self::ConflictResolutionFailed(error.to_string()),
            _ => Self::InvalidPayload(error.to_string()),
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_map_to_taxonomy() {
        assert!(matches!(
            SyncError::from(RecordDecodeError::InvalidVersion("\"x\"".into())),
            SyncError::ConflictResolutionFailed(_)
        ));
        assert!(matches!(
            SyncError::from(RecordDecodeError::MissingField("id")),
            SyncError::InvalidPayload(_)
        ));
    }

    #[test]
    fn classification() {
        assert!(SyncError::Offline.is_transient());
        assert!(!SyncError::Offline.lost_changes());
        assert!(SyncError::PartialSyncFailure(2).lost_changes());
        assert_eq!(
            SyncError::PartialSyncFailure(2).to_string(),
            "2 pending change(s) could not be synced and were dropped"
        );
    }
}
