use std::path::Path;

use tally_core::auth::{AuthSession, FileSessionStore, SessionPersistence};
use tally_core::util::normalize_text_option;

use crate::commands::common::open_engine;
use crate::error::CliError;

pub fn run_login(user_id: &str, token: &str, data_dir: &Path) -> Result<(), CliError> {
    let user_id = normalize_text_option(Some(user_id.to_string()))
        .ok_or_else(|| CliError::Config("User ID cannot be empty".to_string()))?;
    let token = normalize_text_option(Some(token.to_string()))
        .ok_or_else(|| CliError::Config("Access token cannot be empty".to_string()))?;

    let store = FileSessionStore::new(data_dir);
    store.save_session(&AuthSession::new(user_id.clone(), token))?;
    println!("Signed in as {user_id}");
    Ok(())
}

pub async fn run_logout(data_dir: &Path) -> Result<(), CliError> {
    let context = open_engine(data_dir).await?;
    let discarded = context.engine.state().pending_changes_count;
    context.engine.reset().await?;
    FileSessionStore::new(data_dir).clear_session()?;

    if discarded > 0 {
        println!("Signed out; discarded {discarded} unsynced change(s).");
    } else {
        println!("Signed out.");
    }
    Ok(())
}
