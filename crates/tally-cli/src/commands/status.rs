use std::path::Path;

use crate::commands::common::{format_state_lines, open_engine};
use crate::error::CliError;

pub async fn run_status(data_dir: &Path) -> Result<(), CliError> {
    let context = open_engine(data_dir).await?;
    for line in format_state_lines(&context.engine.state(), &context) {
        println!("{line}");
    }
    Ok(())
}
