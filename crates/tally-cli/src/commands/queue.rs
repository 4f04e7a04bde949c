use std::path::Path;

use crate::commands::common::{format_change_lines, open_engine};
use crate::error::CliError;

pub async fn run_queue(as_json: bool, data_dir: &Path) -> Result<(), CliError> {
    let context = open_engine(data_dir).await?;
    let changes = context.engine.pending_changes().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&changes)?);
        return Ok(());
    }

    if changes.is_empty() {
        println!("No pending changes.");
        return Ok(());
    }

    for line in format_change_lines(&changes) {
        println!("{line}");
    }
    Ok(())
}
