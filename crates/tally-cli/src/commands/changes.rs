use std::path::Path;

use serde_json::Value;
use tally_core::db::{ChangeLogStore, LibSqlChangeLogRepository};
use tally_core::{ChangeLogEntry, EntityTable, Operation};

use crate::cli::ChangesCommands;
use crate::commands::common::{
    change_to_item, format_change_lines, format_timestamp, open_database, print_json,
    ChangeListItem,
};
use crate::error::CliError;

pub async fn run_changes(command: ChangesCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        ChangesCommands::List {
            limit,
            pending,
            json,
        } => run_changes_list(limit, pending, json, db_path).await,
        ChangesCommands::Record {
            table,
            row_id,
            operation,
            payload,
        } => {
            let entry = record_change(&table, &row_id, &operation, &payload, db_path).await?;
            println!(
                "Recorded change #{} ({} {}/{}) at {}",
                entry.id,
                entry.operation,
                entry.table_name,
                entry.row_id,
                format_timestamp(entry.timestamp)
            );
            Ok(())
        }
    }
}

pub async fn list_changes(
    limit: usize,
    pending_only: bool,
    db_path: &Path,
) -> Result<Vec<ChangeLogEntry>, CliError> {
    let db = open_database(db_path).await?;
    let change_log = LibSqlChangeLogRepository::new(db.connection());
    let entries = if pending_only {
        change_log.get_pending_changes(limit).await?
    } else {
        change_log.list_recent(limit).await?
    };
    Ok(entries)
}

async fn run_changes_list(
    limit: usize,
    pending_only: bool,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let entries = list_changes(limit, pending_only, db_path).await?;

    if as_json {
        let items = entries
            .iter()
            .map(change_to_item)
            .collect::<Vec<ChangeListItem>>();
        return print_json(&items);
    }

    if entries.is_empty() {
        println!("No changes recorded.");
        return Ok(());
    }
    for line in format_change_lines(&entries) {
        println!("{line}");
    }
    Ok(())
}

pub async fn record_change(
    table: &str,
    row_id: &str,
    operation: &str,
    payload: &str,
    db_path: &Path,
) -> Result<ChangeLogEntry, CliError> {
    let (table, operation, payload) = validate_change(table, operation, payload)?;

    let db = open_database(db_path).await?;
    let change_log = LibSqlChangeLogRepository::new(db.connection());
    Ok(change_log
        .record_change(table.name(), row_id, operation, &payload)
        .await?)
}

/// Check table, operation and payload before anything is written.
pub fn validate_change(
    table: &str,
    operation: &str,
    payload: &str,
) -> Result<(EntityTable, Operation, String), CliError> {
    let table = EntityTable::from_name(table.trim()).ok_or_else(|| {
        let known = EntityTable::ALL
            .iter()
            .map(|table| table.name())
            .collect::<Vec<_>>()
            .join(", ");
        CliError::InvalidInput(format!("Unknown table '{table}'. Known tables: {known}"))
    })?;
    let operation = operation
        .parse::<Operation>()
        .map_err(CliError::InvalidInput)?;
    let payload = serde_json::from_str::<Value>(payload)
        .map_err(|error| CliError::InvalidInput(format!("Payload is not valid JSON: {error}")))?;

    Ok((table, operation, payload.to_string()))
}
