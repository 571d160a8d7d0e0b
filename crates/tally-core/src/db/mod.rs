//! Database layer for Tally

mod change_log_repository;
mod connection;
mod entity_repository;
mod migrations;
mod session_repository;

pub use change_log_repository::{ChangeLogStore, LibSqlChangeLogRepository};
pub use connection::Database;
pub use entity_repository::{
    decide_merge, merge_last_write_wins, EntityStore, LibSqlEntityRepository, MergeOutcome,
};
pub use session_repository::{LibSqlSessionRepository, SessionProvider};
