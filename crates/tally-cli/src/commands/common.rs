use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tally_core::auth::{AuthSession, FileSessionStore, SessionPersistence};
use tally_core::backend::{DisconnectedBackend, RemoteBackend, SupabaseBackend};
use tally_core::config::{BackendConfig, ENV_DATA_DIR};
use tally_core::db::{LibSqlRecordStore, RecordStore};
use tally_core::models::{LocalRecord, PendingChange, RecordId, SyncTable};
use tally_core::sync::{HttpReachabilityProbe, SyncEngine, SyncError, SyncSettings, SyncState};

use crate::error::CliError;

pub const DATABASE_FILE: &str = "tally.db";
pub const PROBE_INTERVAL: Duration = Duration::from_secs(15);
const FIELDS_PREVIEW_CHARS: usize = 80;

/// Everything a command needs, built once per invocation.
pub struct EngineContext {
    pub engine: SyncEngine,
    pub backend_config: Option<BackendConfig>,
    pub session: Option<AuthSession>,
    pub data_dir: PathBuf,
}

impl EngineContext {
    pub fn require_backend(&self) -> Result<&BackendConfig, CliError> {
        self.backend_config
            .as_ref()
            .ok_or(CliError::BackendNotConfigured)
    }

    pub fn require_session(&self) -> Result<&AuthSession, CliError> {
        self.session.as_ref().ok_or(CliError::NotSignedIn)
    }

    /// Probe the backend and report the result to the engine.
    ///
    /// Going online drains any queued changes before this returns.
    pub async fn connect(&self) -> Result<bool, CliError> {
        let config = self.require_backend()?;
        let probe = HttpReachabilityProbe::new(config, PROBE_INTERVAL)?;
        let reachable = probe.check().await;
        self.engine.handle_path_change(reachable).await;
        Ok(reachable)
    }
}

#[derive(Debug, Serialize)]
pub struct RecordListItem {
    pub id: String,
    pub table: String,
    pub sync_version: i64,
    pub pending_sync: bool,
    pub updated_at: String,
    pub deleted_at: Option<String>,
    pub fields: serde_json::Map<String, Value>,
}

pub fn resolve_data_dir(cli_data_dir: Option<PathBuf>) -> Result<PathBuf, CliError> {
    cli_data_dir
        .or_else(|| env::var_os(ENV_DATA_DIR).map(PathBuf::from))
        .map_or_else(default_data_dir, Ok)
}

pub fn default_data_dir() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("tally"))
        .ok_or(CliError::NoDataDir)
}

pub fn load_session(data_dir: &Path) -> Result<Option<AuthSession>, CliError> {
    let session = match AuthSession::from_env() {
        Some(session) => Some(session),
        None => FileSessionStore::new(data_dir).load_session()?,
    };
    if let Some(session) = &session {
        if session.is_expired() {
            tracing::warn!(user_id = session.user_id(), "Stored session has expired");
        }
    }
    Ok(session)
}

pub async fn open_engine(data_dir: &Path) -> Result<EngineContext, CliError> {
    let mut settings = SyncSettings::from_env(data_dir)
        .map_err(CliError::Config)?
        .without_drain_on_enqueue();
    settings.data_dir = data_dir.to_path_buf();

    let backend_config = BackendConfig::from_env().map_err(CliError::Config)?;
    let backend: Arc<dyn RemoteBackend> = match &backend_config {
        Some(config) => Arc::new(SupabaseBackend::new(config.clone())?),
        None => Arc::new(DisconnectedBackend),
    };
    let store: Arc<dyn RecordStore> =
        Arc::new(LibSqlRecordStore::open_path(data_dir.join(DATABASE_FILE)).await?);

    let engine = SyncEngine::load(settings, store, backend).await?;
    let session = load_session(data_dir)?;
    engine.set_session(session.clone()).await;

    Ok(EngineContext {
        engine,
        backend_config,
        session,
        data_dir: data_dir.to_path_buf(),
    })
}

pub fn parse_table(raw: &str) -> Result<SyncTable, CliError> {
    Ok(raw.parse::<SyncTable>()?)
}

pub fn parse_record_id(raw: &str) -> Result<RecordId, CliError> {
    let trimmed = raw.trim();
    trimmed
        .parse::<RecordId>()
        .map_err(|_| CliError::InvalidRecordId(trimmed.to_string()))
}

pub fn parse_payload(raw: &str) -> Result<Value, CliError> {
    match serde_json::from_str::<Value>(raw)? {
        payload @ Value::Object(_) => Ok(payload),
        _ => Err(CliError::PayloadNotObject),
    }
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_state_lines(state: &SyncState, context: &EngineContext) -> Vec<String> {
    let backend = context
        .backend_config
        .as_ref()
        .map_or_else(|| "not configured".to_string(), |config| config.supabase_url.clone());
    let session = context
        .session
        .as_ref()
        .map_or_else(|| "no".to_string(), |session| session.user_id().to_string());
    let last_sync = state
        .last_sync_date
        .map_or_else(|| "never".to_string(), format_timestamp);

    let mut lines = vec![
        format!("Data dir:        {}", context.data_dir.display()),
        format!("Backend:         {backend}"),
        format!("Signed in as:    {session}"),
        format!("Pending changes: {}", state.pending_changes_count),
        format!("Last sync:       {last_sync}"),
    ];
    if let Some(error) = &state.sync_error {
        lines.push(format!("Last error:      {error}"));
    }
    lines
}

pub fn format_change_lines(changes: &[PendingChange]) -> Vec<String> {
    changes
        .iter()
        .map(|change| {
            let retries = if change.retry_count > 0 {
                format!("  (retries: {})", change.retry_count)
            } else {
                String::new()
            };
            format!(
                "{}  {:<6} {}/{}{retries}",
                format_timestamp(change.timestamp),
                change.operation.as_str(),
                change.table,
                change.record_id,
            )
        })
        .collect()
}

pub fn format_record_lines(records: &[LocalRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            let mut flags = String::new();
            if record.pending_sync {
                flags.push_str(" pending");
            }
            if record.is_deleted() {
                flags.push_str(" deleted");
            }
            format!(
                "{}  v{}{flags}  {}",
                record.id,
                record.sync_version,
                fields_preview(record, FIELDS_PREVIEW_CHARS)
            )
        })
        .collect()
}

pub fn fields_preview(record: &LocalRecord, max_chars: usize) -> String {
    let rendered = Value::Object(record.fields.clone()).to_string();
    if rendered.chars().count() <= max_chars {
        return rendered;
    }
    let truncated: String = rendered.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{truncated}...")
}

pub fn record_to_item(record: &LocalRecord) -> RecordListItem {
    RecordListItem {
        id: record.id.to_string(),
        table: record.table.to_string(),
        sync_version: record.sync_version,
        pending_sync: record.pending_sync,
        updated_at: record.updated_at.to_rfc3339(),
        deleted_at: record.deleted_at.map(|deleted_at| deleted_at.to_rfc3339()),
        fields: record.fields.clone(),
    }
}

/// Human summary of the error left by the last drain, if any.
pub fn describe_drain_error(state: &SyncState) -> Option<String> {
    match &state.sync_error {
        Some(SyncError::PartialSyncFailure(count)) => Some(format!(
            "{count} change(s) were dropped after exhausting their retries"
        )),
        Some(error) => Some(error.to_string()),
        None => None,
    }
}
