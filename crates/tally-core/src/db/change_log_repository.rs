//! Change log repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::{Error, Result};
use crate::models::{ChangeLogEntry, ChangeStatus, Operation};
use crate::util::unix_millis_now;
use libsql::{params, Connection, Row};

/// Durable queue of local mutations awaiting upload (async)
#[allow(async_fn_in_trait)]
pub trait ChangeLogStore {
    /// Up to `limit` PENDING entries in insertion order
    async fn get_pending_changes(&self, limit: usize) -> Result<Vec<ChangeLogEntry>>;

    /// Flip the given entries to SYNCED. Unknown or already-synced ids are ignored.
    async fn mark_synced(&self, ids: &[i64]) -> Result<()>;

    /// Re-mark the latest entry for a row as PENDING.
    ///
    /// Returns the id of the re-marked entry, or `None` when the row has no entry.
    async fn mark_for_resync(&self, table: &str, row_id: &str) -> Result<Option<i64>>;

    /// Append a PENDING entry for a local mutation
    async fn record_change(
        &self,
        table: &str,
        row_id: &str,
        operation: Operation,
        payload: &str,
    ) -> Result<ChangeLogEntry>;

    /// Number of PENDING entries
    async fn pending_count(&self) -> Result<u64>;

    /// Most recent entries regardless of status, newest first
    async fn list_recent(&self, limit: usize) -> Result<Vec<ChangeLogEntry>>;
}

/// libSQL implementation of `ChangeLogStore`
pub struct LibSqlChangeLogRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlChangeLogRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &Row) -> Result<ChangeLogEntry> {
        let operation: String = row.get(3)?;
        let sync_status: String = row.get(6)?;

        Ok(ChangeLogEntry {
            id: row.get(0)?,
            table_name: row.get(1)?,
            row_id: row.get(2)?,
            operation: operation.parse().map_err(Error::Database)?,
            payload: row.get(4)?,
            timestamp: row.get(5)?,
            sync_status: sync_status.parse().map_err(Error::Database)?,
        })
    }

    async fn collect_entries(&self, sql: &str, limit: usize) -> Result<Vec<ChangeLogEntry>> {
        let mut rows = self.conn.query(sql, [limit as i64]).await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }
}

impl ChangeLogStore for LibSqlChangeLogRepository<'_> {
    async fn get_pending_changes(&self, limit: usize) -> Result<Vec<ChangeLogEntry>> {
        self.collect_entries(
            "SELECT id, table_name, row_id, operation, payload, timestamp, sync_status
             FROM change_log
             WHERE sync_status = 'PENDING'
             ORDER BY id ASC
             LIMIT ?",
            limit,
        )
        .await
    }

    async fn mark_synced(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        // One statement keeps the batch acknowledgement atomic
        let ids_json = serde_json::to_string(ids)?;
        self.conn
            .execute(
                "UPDATE change_log SET sync_status = 'SYNCED'
                 WHERE sync_status = 'PENDING'
                   AND id IN (SELECT value FROM json_each(?))",
                [ids_json],
            )
            .await?;
        Ok(())
    }

    async fn mark_for_resync(&self, table: &str, row_id: &str) -> Result<Option<i64>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM change_log
                 WHERE table_name = ? AND row_id = ?
                 ORDER BY id DESC
                 LIMIT 1",
                [table, row_id],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let id: i64 = row.get(0)?;
        drop(rows);

        self.conn
            .execute(
                "UPDATE change_log SET sync_status = 'PENDING' WHERE id = ?",
                [id],
            )
            .await?;
        Ok(Some(id))
    }

    async fn record_change(
        &self,
        table: &str,
        row_id: &str,
        operation: Operation,
        payload: &str,
    ) -> Result<ChangeLogEntry> {
        if table.trim().is_empty() || row_id.trim().is_empty() {
            return Err(Error::InvalidInput(
                "change log entries need a table and a row id".into(),
            ));
        }

        let timestamp = unix_millis_now();
        self.conn
            .execute(
                "INSERT INTO change_log (table_name, row_id, operation, payload, timestamp, sync_status)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    table,
                    row_id,
                    operation.as_str(),
                    payload,
                    timestamp,
                    ChangeStatus::Pending.as_str()
                ],
            )
            .await?;

        Ok(ChangeLogEntry {
            id: self.conn.last_insert_rowid(),
            table_name: table.to_string(),
            row_id: row_id.to_string(),
            operation,
            payload: payload.to_string(),
            timestamp,
            sync_status: ChangeStatus::Pending,
        })
    }

    async fn pending_count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM change_log WHERE sync_status = 'PENDING'",
                (),
            )
            .await?;

        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<ChangeLogEntry>> {
        self.collect_entries(
            "SELECT id, table_name, row_id, operation, payload, timestamp, sync_status
             FROM change_log
             ORDER BY id DESC
             LIMIT ?",
            limit,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    async fn seed(repo: &LibSqlChangeLogRepository<'_>, count: usize) -> Vec<i64> {
        let mut ids = Vec::with_capacity(count);
        for index in 0..count {
            let entry = repo
                .record_change(
                    "transactions",
                    &format!("t{index}"),
                    Operation::Insert,
                    "{}",
                )
                .await
                .unwrap();
            ids.push(entry.id);
        }
        ids
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_and_fetch_pending() {
        let db = setup().await;
        let repo = LibSqlChangeLogRepository::new(db.connection());

        let entry = repo
            .record_change("accounts", "a1", Operation::Update, r#"{"id":"a1"}"#)
            .await
            .unwrap();
        assert_eq!(entry.sync_status, ChangeStatus::Pending);

        let pending = repo.get_pending_changes(10).await.unwrap();
        assert_eq!(pending, vec![entry]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pending_respects_limit_and_order() {
        let db = setup().await;
        let repo = LibSqlChangeLogRepository::new(db.connection());
        let ids = seed(&repo, 5).await;

        let pending = repo.get_pending_changes(3).await.unwrap();
        let fetched: Vec<i64> = pending.iter().map(|entry| entry.id).collect();
        assert_eq!(fetched, ids[..3].to_vec());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_synced_is_idempotent() {
        let db = setup().await;
        let repo = LibSqlChangeLogRepository::new(db.connection());
        let ids = seed(&repo, 4).await;

        repo.mark_synced(&ids[..2]).await.unwrap();
        repo.mark_synced(&ids[..2]).await.unwrap();
        repo.mark_synced(&[]).await.unwrap();
        repo.mark_synced(&[9_999]).await.unwrap();

        assert_eq!(repo.pending_count().await.unwrap(), 2);
        let pending = repo.get_pending_changes(10).await.unwrap();
        assert!(pending.iter().all(|entry| ids[2..].contains(&entry.id)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_for_resync_targets_latest_entry() {
        let db = setup().await;
        let repo = LibSqlChangeLogRepository::new(db.connection());

        let first = repo
            .record_change("transactions", "t1", Operation::Insert, "{}")
            .await
            .unwrap();
        let second = repo
            .record_change("transactions", "t1", Operation::Update, "{}")
            .await
            .unwrap();
        repo.mark_synced(&[first.id, second.id]).await.unwrap();

        let resynced = repo.mark_for_resync("transactions", "t1").await.unwrap();
        assert_eq!(resynced, Some(second.id));

        let pending = repo.get_pending_changes(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);
        assert_eq!(pending[0].operation, Operation::Update);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_for_resync_unknown_row() {
        let db = setup().await;
        let repo = LibSqlChangeLogRepository::new(db.connection());

        let resynced = repo.mark_for_resync("transactions", "nope").await.unwrap();
        assert_eq!(resynced, None);
        assert_eq!(repo.pending_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_change_rejects_blank_row_id() {
        let db = setup().await;
        let repo = LibSqlChangeLogRepository::new(db.connection());

        let result = repo
            .record_change("transactions", "  ", Operation::Delete, "{}")
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_recent_includes_synced_entries() {
        let db = setup().await;
        let repo = LibSqlChangeLogRepository::new(db.connection());
        let ids = seed(&repo, 3).await;
        repo.mark_synced(&ids[..1]).await.unwrap();

        let recent = repo.list_recent(10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].id, ids[2]);
        assert_eq!(recent[2].sync_status, ChangeStatus::Synced);
    }
}
