use std::path::Path;

use tally_core::SyncError;

use crate::commands::common::{describe_drain_error, open_engine};
use crate::error::CliError;

pub async fn run_push(data_dir: &Path) -> Result<(), CliError> {
    let context = open_engine(data_dir).await?;
    context.require_session()?;

    let queued = context.engine.state().pending_changes_count;
    if queued == 0 {
        println!("Nothing to push.");
        return Ok(());
    }
    if !context.connect().await? {
        return Err(CliError::Unreachable(queued));
    }

    let state = context.engine.state();
    let dropped = match state.sync_error {
        Some(SyncError::PartialSyncFailure(count)) => count,
        _ => 0,
    };
    let pushed = queued
        .saturating_sub(state.pending_changes_count)
        .saturating_sub(dropped);

    println!(
        "Pushed {pushed} change(s); {} still queued.",
        state.pending_changes_count
    );
    if let Some(message) = describe_drain_error(&state) {
        eprintln!("Warning: {message}");
    }
    Ok(())
}
