use std::path::Path;

use crate::commands::common::{
    format_record_lines, open_engine, parse_table, record_to_item, RecordListItem,
};
use crate::error::CliError;

pub async fn run_records(
    table: &str,
    include_deleted: bool,
    as_json: bool,
    data_dir: &Path,
) -> Result<(), CliError> {
    let table = parse_table(table)?;
    let context = open_engine(data_dir).await?;
    let records: Vec<_> = context
        .engine
        .store()
        .list(table)
        .await?
        .into_iter()
        .filter(|record| include_deleted || !record.is_deleted())
        .collect();

    if as_json {
        let json_items = records
            .iter()
            .map(record_to_item)
            .collect::<Vec<RecordListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if records.is_empty() {
        println!("No {table} records.");
    } else {
        for line in format_record_lines(&records) {
            println!("{line}");
        }
    }

    Ok(())
}
