//! Runtime configuration for clients.
//!
//! `BackendConfig` locates the hosted Supabase project; `SyncSettings` tunes the
//! sync engine (retry budget, per-call timeout, durable file locations).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const REALTIME_PROTOCOL_VERSION: &str = "1.0.0";

pub const ENV_SUPABASE_URL: &str = "TALLY_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "TALLY_SUPABASE_ANON_KEY";
pub const ENV_MAX_RETRIES: &str = "TALLY_MAX_RETRIES";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "TALLY_REQUEST_TIMEOUT_SECS";
pub const ENV_DATA_DIR: &str = "TALLY_DATA_DIR";

/// Public endpoints of the hosted backend.
///
/// The anon key is safe to ship; per-user access tokens never live here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl BackendConfig {
    pub fn new(supabase_url: impl Into<String>, anon_key: impl Into<String>) -> Result<Self, String> {
        let supabase_url = normalize_required_http_url(supabase_url.into(), "supabase_url")?;
        let supabase_anon_key = normalize_required_value(anon_key.into(), "supabase_anon_key")?;
        Ok(Self {
            supabase_url,
            supabase_anon_key,
        })
    }

    /// Read `TALLY_SUPABASE_URL` / `TALLY_SUPABASE_ANON_KEY`.
    ///
    /// Returns `Ok(None)` when neither is set, so callers can run local-only.
    pub fn from_env() -> Result<Option<Self>, String> {
        let url = normalize_text_option(std::env::var(ENV_SUPABASE_URL).ok());
        let key = normalize_text_option(std::env::var(ENV_SUPABASE_ANON_KEY).ok());
        match (url, key) {
            (None, None) => Ok(None),
            (Some(url), Some(key)) => Self::new(url, key).map(Some),
            (Some(_), None) => Err(format!("{ENV_SUPABASE_ANON_KEY} is required")),
            (None, Some(_)) => Err(format!("{ENV_SUPABASE_URL} is required")),
        }
    }

    /// PostgREST base URL.
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.supabase_url)
    }

    /// Realtime websocket URL with the API key and protocol version attached.
    pub fn realtime_url(&self) -> String {
        let base = if let Some(rest) = self.supabase_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.supabase_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.supabase_url.clone()
        };
        format!(
            "{base}/realtime/v1/websocket?apikey={}&vsn={REALTIME_PROTOCOL_VERSION}",
            urlencoding::encode(&self.supabase_anon_key)
        )
    }
}

/// Tuning for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Failed attempts after which a queued change is abandoned
    pub max_retries: u32,
    /// Timeout for each remote call (not for a whole drain)
    pub request_timeout: Duration,
    /// Whether a full pull also fetches soft-deleted rows
    pub full_sync_include_deleted: bool,
    /// Whether `enqueue` kicks off a background drain while online
    pub drain_on_enqueue: bool,
    /// Directory holding the queue and watermark files
    pub data_dir: PathBuf,
}

impl SyncSettings {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            full_sync_include_deleted: false,
            drain_on_enqueue: true,
            data_dir: data_dir.into(),
        }
    }

    /// Apply `TALLY_MAX_RETRIES`, `TALLY_REQUEST_TIMEOUT_SECS` and `TALLY_DATA_DIR`
    /// on top of the defaults rooted at `default_data_dir`.
    pub fn from_env(default_data_dir: impl Into<PathBuf>) -> Result<Self, String> {
        let mut settings = Self::new(default_data_dir);

        if let Some(dir) = normalize_text_option(std::env::var(ENV_DATA_DIR).ok()) {
            settings.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = normalize_text_option(std::env::var(ENV_MAX_RETRIES).ok()) {
            settings.max_retries = parse_max_retries(&raw)?;
        }
        if let Some(raw) = normalize_text_option(std::env::var(ENV_REQUEST_TIMEOUT_SECS).ok()) {
            let secs = raw
                .parse::<u64>()
                .map_err(|_| format!("{ENV_REQUEST_TIMEOUT_SECS} must be a whole number"))?;
            settings.request_timeout = Duration::from_secs(secs.max(1));
        }

        Ok(settings)
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub const fn without_drain_on_enqueue(mut self) -> Self {
        self.drain_on_enqueue = false;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn including_deleted_on_full_sync(mut self) -> Self {
        self.full_sync_include_deleted = true;
        self
    }

    pub fn queue_path(&self) -> PathBuf {
        self.data_dir.join("pending_changes.json")
    }

    pub fn watermark_path(&self) -> PathBuf {
        self.data_dir.join("sync_watermark.json")
    }
}

fn parse_max_retries(raw: &str) -> Result<u32, String> {
    match raw.parse::<u32>() {
        Ok(0) => Err(format!("{ENV_MAX_RETRIES} must be at least 1")),
        Ok(value) => Ok(value),
        Err(_) => Err(format!("{ENV_MAX_RETRIES} must be a whole number")),
    }
}

fn normalize_required_value(raw: String, field: &str) -> Result<String, String> {
    normalize_text_option(Some(raw)).ok_or_else(|| format!("config field '{field}' is required"))
}

fn normalize_required_http_url(raw: String, field: &str) -> Result<String, String> {
    let value = normalize_required_value(raw, field)?;
    if is_http_url(&value) {
        Ok(value.trim_end_matches('/').to_string())
    } else {
        Err(format!("config field '{field}' must include http:// or https://"))
    }
}
