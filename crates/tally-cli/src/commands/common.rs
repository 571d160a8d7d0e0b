use std::env;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_core::config::SyncSettings;
use tally_core::db::Database;
use tally_core::ChangeLogEntry;

use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct ChangeListItem {
    pub id: i64,
    pub table: String,
    pub row_id: String,
    pub operation: String,
    pub status: String,
    pub timestamp: i64,
    pub timestamp_iso: String,
    pub payload: String,
}

pub fn change_to_item(entry: &ChangeLogEntry) -> ChangeListItem {
    ChangeListItem {
        id: entry.id,
        table: entry.table_name.clone(),
        row_id: entry.row_id.clone(),
        operation: entry.operation.as_str().to_string(),
        status: entry.sync_status.as_str().to_string(),
        timestamp: entry.timestamp,
        timestamp_iso: format_timestamp(entry.timestamp),
        payload: entry.payload.clone(),
    }
}

pub fn format_change_lines(entries: &[ChangeLogEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            format!(
                "#{:<6} {:<8} {:<6} {}/{}  {}",
                entry.id,
                entry.sync_status.as_str(),
                entry.operation.as_str(),
                entry.table_name,
                entry.row_id,
                format_timestamp(entry.timestamp)
            )
        })
        .collect()
}

/// Render Unix milliseconds as UTC; `0` means the event never happened.
pub fn format_timestamp(millis: i64) -> String {
    if millis <= 0 {
        return "never".to_string();
    }
    DateTime::<Utc>::from_timestamp_millis(millis).map_or_else(
        || millis.to_string(),
        |timestamp| timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

/// Resolved profile plus its effective sync settings
pub struct ProfileSettings {
    pub name: String,
    pub db_path: Option<PathBuf>,
    pub settings: SyncSettings,
}

pub fn load_profile_settings(profile: Option<&str>) -> Result<ProfileSettings, CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let name = config.resolve_profile_name(profile);
    let settings = config.effective_settings(&name);
    let db_path = config
        .profile(&name)
        .and_then(|profile| profile.db_path.clone());
    Ok(ProfileSettings {
        name,
        db_path,
        settings,
    })
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>, profile_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("TALLY_DB_PATH").map(PathBuf::from))
        .or(profile_db_path)
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tally")
        .join("tally.db")
}

pub async fn open_database(path: &Path) -> Result<Database, CliError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(Database::open(path).await?)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
