use std::path::Path;

use serde_json::Value;
use tally_core::sync::EntityRegistry;
use tally_core::EntityTable;

use crate::cli::RecordsCommands;
use crate::commands::common::{format_timestamp, open_database, print_json};
use crate::error::CliError;

pub async fn run_records(command: RecordsCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        RecordsCommands::List { table, limit, json } => {
            let records = list_records(&table, limit, db_path).await?;
            if json {
                return print_json(&records);
            }
            if records.is_empty() {
                println!("No {table} stored.");
                return Ok(());
            }
            for line in format_record_lines(&records) {
                println!("{line}");
            }
            Ok(())
        }
    }
}

pub async fn list_records(
    table: &str,
    limit: usize,
    db_path: &Path,
) -> Result<Vec<Value>, CliError> {
    let table = EntityTable::from_name(table.trim())
        .ok_or_else(|| CliError::InvalidInput(format!("Unknown table '{table}'")))?;

    let db = open_database(db_path).await?;
    Ok(EntityRegistry::new(db.connection())
        .list_json(table, limit)
        .await?)
}

pub fn format_record_lines(records: &[Value]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            let id = record.get("id").and_then(Value::as_str).unwrap_or("?");
            let status = record
                .get("syncStatus")
                .and_then(Value::as_str)
                .unwrap_or("?");
            let changed = record
                .get("updatedAt")
                .or_else(|| record.get("createdAt"))
                .and_then(Value::as_i64)
                .unwrap_or_default();
            format!("{id:<38} {status:<13} {}", format_timestamp(changed))
        })
        .collect()
}
