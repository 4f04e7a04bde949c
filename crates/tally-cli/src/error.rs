use std::io;

use tally_core::auth::AuthError;
use tally_core::backend::BackendError;
use tally_core::models::UnknownTable;
use tally_core::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tally_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    UnknownTable(#[from] UnknownTable),
    #[error("Invalid record ID: {0}")]
    InvalidRecordId(String),
    #[error("Record payload must be a JSON object")]
    PayloadNotObject,
    #[error("Record not found: {0}")]
    RecordNotFound(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Could not determine a data directory; pass --data-dir or set TALLY_DATA_DIR")]
    NoDataDir,
    #[error(
        "Backend is not configured. Set TALLY_SUPABASE_URL and TALLY_SUPABASE_ANON_KEY (a .env file works)."
    )]
    BackendNotConfigured,
    #[error("Not signed in. Run `tally login` or set TALLY_USER_ID and TALLY_ACCESS_TOKEN.")]
    NotSignedIn,
    #[error("Backend is unreachable; {0} change(s) remain queued")]
    Unreachable(usize),
}
