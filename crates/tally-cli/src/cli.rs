use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Run and inspect Tally change-log sync from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for sync configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronize with the configured server
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Inspect or append change log entries
    Changes {
        #[command(subcommand)]
        command: ChangesCommands,
    },
    /// Manage the signed-in user
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Inspect synchronized records
    Records {
        #[command(subcommand)]
        command: RecordsCommands,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Run a single sync pass
    Run {
        /// Override the number of changes uploaded in this run
        #[arg(long, value_name = "N")]
        batch_size: Option<usize>,
    },
    /// Sync periodically until interrupted
    Watch,
    /// Show user, checkpoint and pending change count
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ChangesCommands {
    /// List recent change log entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Only show entries waiting for upload
        #[arg(long)]
        pending: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Append a change for a local mutation
    Record {
        /// Wire table name, e.g. `transactions`
        #[arg(long)]
        table: String,
        /// Record id
        #[arg(long)]
        row_id: String,
        /// INSERT, UPDATE or DELETE
        #[arg(long)]
        operation: String,
        /// JSON snapshot of the record
        #[arg(long)]
        payload: String,
    },
}

#[derive(Subcommand)]
pub enum SessionCommands {
    /// Set the user sync runs on behalf of
    Login {
        #[arg(long, value_name = "ID")]
        user_id: String,
        #[arg(long, value_name = "EMAIL")]
        email: Option<String>,
    },
    /// Clear the user and reset the sync checkpoint
    Logout,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Sync API base URL (e.g. <https://api.example.com/v1>)
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Changes uploaded per run
        #[arg(long, value_name = "N")]
        batch_size: Option<usize>,
        /// Seconds between periodic syncs
        #[arg(long, value_name = "SECS")]
        sync_interval_secs: Option<u64>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved profile configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum RecordsCommands {
    /// List stored records of one table, most recently changed first
    List {
        /// Wire table name, e.g. `accounts`
        #[arg(long)]
        table: String,
        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
