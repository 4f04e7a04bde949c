use std::path::Path;

use tally_core::models::ChangeOperation;

use crate::commands::common::{open_engine, parse_record_id, parse_table};
use crate::error::CliError;

pub async fn run_delete(table: &str, id: &str, data_dir: &Path) -> Result<(), CliError> {
    let table = parse_table(table)?;
    let id = parse_record_id(id)?;
    let context = open_engine(data_dir).await?;

    if context.engine.store().fetch(table, id).await?.is_none() {
        return Err(CliError::RecordNotFound(format!("{table}/{id}")));
    }

    context
        .engine
        .record_local_change(table, id, ChangeOperation::Delete, None)
        .await?;
    println!("Deleted {table}/{id} (queued)");
    Ok(())
}
