use std::path::Path;

use tally_core::models::{ChangeOperation, RecordId};

use crate::commands::common::{open_engine, parse_payload, parse_record_id, parse_table};
use crate::error::CliError;

pub async fn run_put(
    table: &str,
    payload: &str,
    id: Option<&str>,
    data_dir: &Path,
) -> Result<(), CliError> {
    let table = parse_table(table)?;
    let payload = parse_payload(payload)?;
    let id = id.map(parse_record_id).transpose()?;
    let context = open_engine(data_dir).await?;

    let (id, operation) = match id {
        Some(id) => match context.engine.store().fetch(table, id).await? {
            Some(existing) if !existing.is_deleted() => (id, ChangeOperation::Update),
            _ => (id, ChangeOperation::Insert),
        },
        None => (RecordId::new(), ChangeOperation::Insert),
    };

    context
        .engine
        .record_local_change(table, id, operation, Some(payload))
        .await?;
    println!("{id}");
    Ok(())
}
