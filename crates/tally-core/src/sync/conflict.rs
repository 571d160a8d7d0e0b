//! Applying the server's per-row conflict decisions.

use tracing::{debug, info, warn};

use super::wire::{ConflictItem, Resolution};
use crate::db::ChangeLogStore;
use crate::error::Result;

/// Local effect of one conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAction {
    /// Nothing to do locally; the download overwrites the row later
    KeepServer,
    /// The latest change log entry for the row was re-queued
    Resync { entry_id: i64 },
    /// Client won but the row has no change log entry to re-queue
    NothingToResync,
}

impl ConflictAction {
    pub const fn resynced_entry(self) -> Option<i64> {
        match self {
            Self::Resync { entry_id } => Some(entry_id),
            Self::KeepServer | Self::NothingToResync => None,
        }
    }
}

pub struct ConflictResolver<'a, C: ChangeLogStore> {
    change_log: &'a C,
}

impl<'a, C: ChangeLogStore> ConflictResolver<'a, C> {
    pub const fn new(change_log: &'a C) -> Self {
        Self { change_log }
    }

    pub async fn resolve(&self, conflict: &ConflictItem) -> Result<ConflictAction> {
        match &conflict.resolution {
            Resolution::ServerWins => {
                debug!(table = %conflict.table, row_id = %conflict.row_id, "Server wins conflict");
                Ok(ConflictAction::KeepServer)
            }
            Resolution::ClientWins => {
                let resynced = self
                    .change_log
                    .mark_for_resync(&conflict.table, &conflict.row_id)
                    .await?;
                match resynced {
                    Some(entry_id) => {
                        info!(
                            table = %conflict.table,
                            row_id = %conflict.row_id,
                            entry_id,
                            "Client wins conflict; change queued for re-upload"
                        );
                        Ok(ConflictAction::Resync { entry_id })
                    }
                    None => {
                        warn!(
                            table = %conflict.table,
                            row_id = %conflict.row_id,
                            "Client wins conflict for a row without change log entries"
                        );
                        Ok(ConflictAction::NothingToResync)
                    }
                }
            }
            Resolution::Merge => {
                // No field-level merge exists; the server copy arrives with the download
                info!(
                    table = %conflict.table,
                    row_id = %conflict.row_id,
                    "Merge conflict handled as server wins"
                );
                Ok(ConflictAction::KeepServer)
            }
            Resolution::Other(raw) => {
                warn!(
                    table = %conflict.table,
                    row_id = %conflict.row_id,
                    resolution = %raw,
                    "Unknown conflict resolution handled as server wins"
                );
                Ok(ConflictAction::KeepServer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, LibSqlChangeLogRepository};
    use crate::models::Operation;

    fn conflict(row_id: &str, resolution: &str) -> ConflictItem {
        ConflictItem {
            table: "transactions".to_string(),
            row_id: row_id.to_string(),
            resolution: Resolution::from(resolution.to_string()),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn client_wins_requeues_latest_entry() {
        let db = Database::open_in_memory().await.unwrap();
        let change_log = LibSqlChangeLogRepository::new(db.connection());
        let entry = change_log
            .record_change("transactions", "t1", Operation::Update, "{}")
            .await
            .unwrap();
        change_log.mark_synced(&[entry.id]).await.unwrap();

        let resolver = ConflictResolver::new(&change_log);
        let action = resolver.resolve(&conflict("t1", "client_wins")).await.unwrap();

        assert_eq!(action, ConflictAction::Resync { entry_id: entry.id });
        assert_eq!(change_log.pending_count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn other_resolutions_take_no_local_action() {
        let db = Database::open_in_memory().await.unwrap();
        let change_log = LibSqlChangeLogRepository::new(db.connection());
        let entry = change_log
            .record_change("transactions", "t1", Operation::Update, "{}")
            .await
            .unwrap();
        change_log.mark_synced(&[entry.id]).await.unwrap();

        let resolver = ConflictResolver::new(&change_log);
        for resolution in ["server_wins", "merge", "last_one_wins"] {
            let action = resolver.resolve(&conflict("t1", resolution)).await.unwrap();
            assert_eq!(action, ConflictAction::KeepServer);
        }
        assert_eq!(change_log.pending_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn client_wins_without_entry() {
        let db = Database::open_in_memory().await.unwrap();
        let change_log = LibSqlChangeLogRepository::new(db.connection());

        let action = ConflictResolver::new(&change_log)
            .resolve(&conflict("ghost", "client_wins"))
            .await
            .unwrap();
        assert_eq!(action, ConflictAction::NothingToResync);
        assert_eq!(action.resynced_entry(), None);
    }
}
