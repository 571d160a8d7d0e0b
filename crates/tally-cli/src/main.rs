//! Tally CLI - run and inspect change-log sync from the terminal
//!
//! Drives the same sync engine the apps use against a local database file.

mod cli;
mod commands;
mod config_profiles;
mod error;

use std::path::PathBuf;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::changes::run_changes;
use crate::commands::common::{load_profile_settings, resolve_db_path, ProfileSettings};
use crate::commands::config::run_config;
use crate::commands::records::run_records;
use crate::commands::session::run_session;
use crate::commands::sync::run_sync;
use crate::error::CliError;

/// Target prefix match covers both `tally_cli` and `tally_core`
pub(crate) const DEFAULT_LOG_FILTER: &str = "tally=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let Cli {
        command,
        db_path,
        profile,
    } = Cli::parse();

    match command {
        Commands::Config { command } => run_config(command, profile.as_deref()),
        Commands::Sync { command } => {
            let (profile, db_path) = resolve_context(db_path, profile.as_deref())?;
            run_sync(command, profile, &db_path).await
        }
        Commands::Changes { command } => {
            let (_, db_path) = resolve_context(db_path, profile.as_deref())?;
            run_changes(command, &db_path).await
        }
        Commands::Session { command } => {
            let (_, db_path) = resolve_context(db_path, profile.as_deref())?;
            run_session(command, &db_path).await
        }
        Commands::Records { command } => {
            let (_, db_path) = resolve_context(db_path, profile.as_deref())?;
            run_records(command, &db_path).await
        }
    }
}

fn resolve_context(
    cli_db_path: Option<PathBuf>,
    profile: Option<&str>,
) -> Result<(ProfileSettings, PathBuf), CliError> {
    let profile = load_profile_settings(profile)?;
    let db_path = resolve_db_path(cli_db_path, profile.db_path.clone());
    tracing::debug!(profile = %profile.name, db_path = %db_path.display(), "Resolved CLI context");
    Ok((profile, db_path))
}
