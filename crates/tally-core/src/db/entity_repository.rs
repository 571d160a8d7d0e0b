//! Entity repository implementation shared by every synchronized table

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use std::marker::PhantomData;

use crate::error::{Error, Result};
use crate::models::SyncEntity;
use libsql::{params, Connection};

/// What happened to an incoming record during a last-write-wins merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No local row existed; the incoming one was inserted
    Inserted,
    /// The incoming row was strictly newer and replaced the local one
    Updated,
    /// The local row was as new or newer; the incoming one was dropped
    Discarded,
}

/// Decide how an incoming record merges with the local copy.
///
/// Strictly newer wins; ties keep the local row.
pub fn decide_merge<E: SyncEntity>(local: Option<&E>, incoming: &E) -> MergeOutcome {
    match local {
        None => MergeOutcome::Inserted,
        Some(local) if incoming.recency() > local.recency() => MergeOutcome::Updated,
        Some(_) => MergeOutcome::Discarded,
    }
}

/// Storage contract a feature's table exposes to the sync engine (async)
#[allow(async_fn_in_trait)]
pub trait EntityStore<E: SyncEntity> {
    /// Point lookup by record id
    async fn get_by_id(&self, id: &str) -> Result<Option<E>>;

    async fn insert(&self, record: &E) -> Result<()>;

    async fn update(&self, record: &E) -> Result<()>;

    /// Most recently changed records first
    async fn list(&self, limit: usize) -> Result<Vec<E>>;

    /// Merge a server record into local storage with last-write-wins.
    ///
    /// Written records are forced to the synced state.
    async fn apply_incoming(&self, incoming: E) -> Result<MergeOutcome> {
        merge_last_write_wins(self, incoming).await
    }
}

/// Look up the local copy, decide, and write through `store`.
pub async fn merge_last_write_wins<E, S>(store: &S, mut incoming: E) -> Result<MergeOutcome>
where
    E: SyncEntity,
    S: EntityStore<E> + ?Sized,
{
    let local = store.get_by_id(incoming.id()).await?;
    let outcome = decide_merge(local.as_ref(), &incoming);

    match outcome {
        MergeOutcome::Inserted => {
            incoming.mark_synced();
            store.insert(&incoming).await?;
        }
        MergeOutcome::Updated => {
            incoming.mark_synced();
            store.update(&incoming).await?;
        }
        MergeOutcome::Discarded => {
            tracing::debug!(
                table = E::TABLE.name(),
                id = incoming.id(),
                "Discarded incoming row that is not newer than local copy"
            );
        }
    }

    Ok(outcome)
}

/// libSQL implementation of `EntityStore`, one instance per record type
pub struct LibSqlEntityRepository<'a, E> {
    conn: &'a Connection,
    _entity: PhantomData<fn() -> E>,
}

impl<'a, E: SyncEntity> LibSqlEntityRepository<'a, E> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            _entity: PhantomData,
        }
    }

    fn table() -> &'static str {
        E::TABLE.name()
    }

    fn parse_record(data: &str) -> Result<E> {
        Ok(serde_json::from_str(data)?)
    }

    /// Run the lookup, comparison and write as one immediate transaction so a
    /// concurrent writer on another connection cannot slip in between.
    async fn apply_incoming_atomically(&self, incoming: E) -> Result<MergeOutcome> {
        self.conn.execute("BEGIN IMMEDIATE", ()).await?;

        let outcome = match merge_last_write_wins(self, incoming).await {
            Ok(outcome) => outcome,
            Err(error) => {
                self.conn.execute("ROLLBACK", ()).await.ok();
                return Err(error);
            }
        };

        if let Err(error) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(error.into());
        }

        Ok(outcome)
    }
}

impl<E: SyncEntity> EntityStore<E> for LibSqlEntityRepository<'_, E> {
    async fn get_by_id(&self, id: &str) -> Result<Option<E>> {
        let sql = format!("SELECT data FROM {} WHERE id = ?", Self::table());
        let mut rows = self.conn.query(&sql, [id]).await?;

        match rows.next().await? {
            Some(row) => {
                let data: String = row.get(0)?;
                Self::parse_record(&data).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn insert(&self, record: &E) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, recency, sync_status, data) VALUES (?, ?, ?, ?)",
            Self::table()
        );
        let data = serde_json::to_string(record)?;

        self.conn
            .execute(
                &sql,
                params![
                    record.id(),
                    record.recency(),
                    record.sync_status().as_str(),
                    data
                ],
            )
            .await?;
        Ok(())
    }

    async fn update(&self, record: &E) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET recency = ?, sync_status = ?, data = ? WHERE id = ?",
            Self::table()
        );
        let data = serde_json::to_string(record)?;

        let rows = self
            .conn
            .execute(
                &sql,
                params![
                    record.recency(),
                    record.sync_status().as_str(),
                    data,
                    record.id()
                ],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(format!("{}/{}", Self::table(), record.id())));
        }
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<E>> {
        let sql = format!(
            "SELECT data FROM {} ORDER BY recency DESC, id ASC LIMIT ?",
            Self::table()
        );
        let mut rows = self.conn.query(&sql, [limit as i64]).await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            let data: String = row.get(0)?;
            records.push(Self::parse_record(&data)?);
        }
        Ok(records)
    }

    async fn apply_incoming(&self, incoming: E) -> Result<MergeOutcome> {
        self.apply_incoming_atomically(incoming).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{Account, SavingsContribution, SyncStatus};
    use serde_json::json;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn account(id: &str, balance_cents: i64, updated_at: i64) -> Account {
        serde_json::from_value(json!({
            "id": id,
            "userId": "u1",
            "name": "Wallet",
            "type": "CASH",
            "balanceCents": balance_cents,
            "currency": "CNY",
            "createdAt": 1,
            "updatedAt": updated_at,
        }))
        .unwrap()
    }

    #[test]
    fn test_decide_merge_is_strict() {
        let local = account("a1", 100, 10);
        assert_eq!(
            decide_merge(None, &account("a1", 1, 10)),
            MergeOutcome::Inserted
        );
        assert_eq!(
            decide_merge(Some(&local), &account("a1", 1, 11)),
            MergeOutcome::Updated
        );
        assert_eq!(
            decide_merge(Some(&local), &account("a1", 1, 10)),
            MergeOutcome::Discarded
        );
        assert_eq!(
            decide_merge(Some(&local), &account("a1", 1, 9)),
            MergeOutcome::Discarded
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_get_update() {
        let db = setup().await;
        let repo = LibSqlEntityRepository::<Account>::new(db.connection());

        repo.insert(&account("a1", 100, 10)).await.unwrap();
        let fetched = repo.get_by_id("a1").await.unwrap().unwrap();
        assert_eq!(fetched.balance_cents, 100);

        repo.update(&account("a1", 250, 20)).await.unwrap();
        let fetched = repo.get_by_id("a1").await.unwrap().unwrap();
        assert_eq!(fetched.balance_cents, 250);
        assert_eq!(fetched.updated_at, 20);

        assert!(repo.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_missing_row_fails() {
        let db = setup().await;
        let repo = LibSqlEntityRepository::<Account>::new(db.connection());

        let result = repo.update(&account("ghost", 1, 1)).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_apply_incoming_last_write_wins() {
        let db = setup().await;
        let repo = LibSqlEntityRepository::<Account>::new(db.connection());
        repo.insert(&account("a1", 100, 10)).await.unwrap();

        let tie = repo.apply_incoming(account("a1", 999, 10)).await.unwrap();
        assert_eq!(tie, MergeOutcome::Discarded);
        assert_eq!(repo.get_by_id("a1").await.unwrap().unwrap().balance_cents, 100);

        let older = repo.apply_incoming(account("a1", 999, 9)).await.unwrap();
        assert_eq!(older, MergeOutcome::Discarded);
        assert_eq!(repo.get_by_id("a1").await.unwrap().unwrap().balance_cents, 100);

        let newer = repo.apply_incoming(account("a1", 999, 11)).await.unwrap();
        assert_eq!(newer, MergeOutcome::Updated);
        let stored = repo.get_by_id("a1").await.unwrap().unwrap();
        assert_eq!(stored.balance_cents, 999);
        assert_eq!(stored.sync_status, SyncStatus::Synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_apply_incoming_twice_is_idempotent() {
        let db = setup().await;
        let repo = LibSqlEntityRepository::<Account>::new(db.connection());

        let first = repo.apply_incoming(account("a1", 500, 1500)).await.unwrap();
        let second = repo.apply_incoming(account("a1", 500, 1500)).await.unwrap();
        assert_eq!(first, MergeOutcome::Inserted);
        assert_eq!(second, MergeOutcome::Discarded);
        assert_eq!(repo.list(10).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_contributions_compare_created_at() {
        let db = setup().await;
        let repo = LibSqlEntityRepository::<SavingsContribution>::new(db.connection());
        let contribution = |amount: f64, created_at: i64| -> SavingsContribution {
            serde_json::from_value(json!({
                "id": "sc1",
                "goalId": "g1",
                "amount": amount,
                "createdAt": created_at,
            }))
            .unwrap()
        };

        repo.apply_incoming(contribution(10.0, 100)).await.unwrap();
        let outcome = repo.apply_incoming(contribution(20.0, 101)).await.unwrap();
        assert_eq!(outcome, MergeOutcome::Updated);
        assert!((repo.get_by_id("sc1").await.unwrap().unwrap().amount - 20.0).abs() < f64::EPSILON);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_orders_by_recency() {
        let db = setup().await;
        let repo = LibSqlEntityRepository::<Account>::new(db.connection());
        repo.insert(&account("old", 1, 10)).await.unwrap();
        repo.insert(&account("new", 1, 30)).await.unwrap();
        repo.insert(&account("mid", 1, 20)).await.unwrap();

        let ids: Vec<String> = repo
            .list(10)
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_merge_sees_committed_write_from_other_connection() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open(tmp.path().join("tally.db")).await.unwrap();
        let ui_conn = db.connect().await.unwrap();
        let ui = LibSqlEntityRepository::<Account>::new(&ui_conn);
        let sync = LibSqlEntityRepository::<Account>::new(db.connection());

        ui.insert(&account("a1", 100, 20)).await.unwrap();

        let outcome = sync.apply_incoming(account("a1", 5, 15)).await.unwrap();
        assert_eq!(outcome, MergeOutcome::Discarded);
        let stored = ui.get_by_id("a1").await.unwrap().unwrap();
        assert_eq!(stored.balance_cents, 100);

        let outcome = sync.apply_incoming(account("a1", 7, 25)).await.unwrap();
        assert_eq!(outcome, MergeOutcome::Updated);
        assert_eq!(ui.get_by_id("a1").await.unwrap().unwrap().balance_cents, 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_merge_waits_for_open_write_on_other_connection() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open(tmp.path().join("tally.db")).await.unwrap();
        let sync_conn = db.connection().clone();
        let ui_conn = db.connect().await.unwrap();
        let ui = LibSqlEntityRepository::<Account>::new(&ui_conn);

        ui.insert(&account("a1", 100, 10)).await.unwrap();

        // A local edit is in flight when the remote row arrives
        ui_conn.execute("BEGIN IMMEDIATE", ()).await.unwrap();
        ui.update(&account("a1", 999, 20)).await.unwrap();

        let merge = tokio::spawn(async move {
            LibSqlEntityRepository::<Account>::new(&sync_conn)
                .apply_incoming(account("a1", 5, 15))
                .await
        });
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(!merge.is_finished());

        ui_conn.execute("COMMIT", ()).await.unwrap();
        let outcome = merge.await.unwrap().unwrap();

        assert_eq!(outcome, MergeOutcome::Discarded);
        let stored = ui.get_by_id("a1").await.unwrap().unwrap();
        assert_eq!(stored.balance_cents, 999);
        assert_eq!(stored.updated_at, 20);
    }
}
