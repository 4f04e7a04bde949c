//! Authenticated principal used by sync.
//!
//! Sign-in flows live outside this crate; sync only needs the resulting
//! session to scope queries and authorize requests.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::normalize_text_option;

const EXPIRY_SKEW_SECONDS: i64 = 60;

pub const ENV_ACCESS_TOKEN: &str = "TALLY_ACCESS_TOKEN";
pub const ENV_USER_ID: &str = "TALLY_USER_ID";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds; `None` for tokens without a known expiry
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl AuthSession {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            user: AuthUser {
                id: user_id.into(),
                email: None,
            },
        }
    }

    /// Build a session from `TALLY_USER_ID` / `TALLY_ACCESS_TOKEN`.
    pub fn from_env() -> Option<Self> {
        let user_id = normalize_text_option(std::env::var(ENV_USER_ID).ok())?;
        let token = normalize_text_option(std::env::var(ENV_ACCESS_TOKEN).ok())?;
        Some(Self::new(user_id, token))
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at <= unix_timestamp_now() + EXPIRY_SKEW_SECONDS)
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Failed to parse session: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Session storage error: {0}")]
    Storage(#[from] std::io::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;

pub trait SessionPersistence: Send + Sync {
    fn load_session(&self) -> AuthResult<Option<AuthSession>>;
    fn save_session(&self, session: &AuthSession) -> AuthResult<()>;
    fn clear_session(&self) -> AuthResult<()>;
}

/// Session stored as JSON next to the other durable sync files.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("session.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionPersistence for FileSessionStore {
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serde_json::to_string_pretty(session)?)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn clear_session(&self) -> AuthResult<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

fn unix_timestamp_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_debug_redacts_tokens() {
        let mut session = AuthSession::new("user", "secret-access-token");
        session.refresh_token = Some("secret-refresh-token".to_string());
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("secret-access-token"));
        assert!(!rendered.contains("secret-refresh-token"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn session_without_expiry_never_expires() {
        let session = AuthSession::new("user", "token");
        assert!(!session.is_expired());

        let expired = AuthSession {
            expires_at: Some(1_000),
            ..session
        };
        assert!(expired.is_expired());
    }

    #[test]
    fn file_store_round_trips_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        assert!(store.load_session().unwrap().is_none());

        let session = AuthSession::new("user-1", "token");
        store.save_session(&session).unwrap();
        assert_eq!(store.load_session().unwrap(), Some(session));

        store.clear_session().unwrap();
        assert!(store.load_session().unwrap().is_none());
        assert!(!store.path().exists());
    }
}
