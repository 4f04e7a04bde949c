use std::path::Path;

use tally_core::sync::PullKind;
use tally_core::SyncError;

use crate::commands::common::open_engine;
use crate::error::CliError;

pub async fn run_pull(full: bool, data_dir: &Path) -> Result<(), CliError> {
    let context = open_engine(data_dir).await?;
    context.require_session()?;
    if !context.connect().await? {
        return Err(SyncError::Offline.into());
    }

    let kind = if full {
        PullKind::Full
    } else {
        PullKind::Incremental
    };
    let report = context.engine.pull(kind).await?;

    println!(
        "Pulled {} row(s): {} new, {} updated, {} unchanged, {} skipped.",
        report.fetched, report.inserted, report.overwritten, report.unchanged, report.skipped
    );
    let pending = context.engine.state().pending_changes_count;
    if pending > 0 {
        println!("{pending} local change(s) still queued.");
    }
    Ok(())
}
