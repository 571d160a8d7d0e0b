//! tally-core - Core library for Tally
//!
//! This crate contains the record models, the libSQL storage layer, and the
//! change-log sync engine shared by every Tally client.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod state;
pub mod sync;
pub mod util;

pub use config::SyncSettings;
pub use error::{Error, Result};
pub use models::{ChangeLogEntry, Checkpoint, EntityTable, Operation, SyncEntity, User};
pub use state::SyncState;
