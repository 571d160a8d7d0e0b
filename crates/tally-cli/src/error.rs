use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tally_core::Error),
    #[error(transparent)]
    Transport(#[from] tally_core::sync::TransportError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("Sync failed: {0}")]
    SyncFailed(String),
    #[error("Sync failed, retry later: {0}")]
    SyncRetry(String),
    #[error(
        "Sync is not configured. Run `tally config init --api-base-url <URL>` or set TALLY_API_BASE_URL."
    )]
    SyncNotConfigured,
}
