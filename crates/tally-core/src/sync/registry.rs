//! Table name to typed store dispatch.

use std::ops::AddAssign;

use libsql::Connection;
use serde_json::Value;
use tracing::{debug, warn};

use crate::db::{EntityStore, LibSqlEntityRepository, MergeOutcome};
use crate::error::Result;
use crate::models::{
    Account, Budget, Category, Countdown, EntityTable, Habit, HabitRecord, RecurringTransaction,
    SavingsContribution, SavingsGoal, SyncEntity, Task, Transaction,
};

/// Per-row results of applying remote rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyCounts {
    pub inserted: usize,
    pub updated: usize,
    pub discarded: usize,
    /// Rows that did not decode into the table's record type
    pub skipped: usize,
}

impl ApplyCounts {
    pub const fn applied(&self) -> usize {
        self.inserted + self.updated
    }

    fn record(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Inserted => self.inserted += 1,
            MergeOutcome::Updated => self.updated += 1,
            MergeOutcome::Discarded => self.discarded += 1,
        }
    }
}

impl AddAssign for ApplyCounts {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.discarded += other.discarded;
        self.skipped += other.skipped;
    }
}

/// Routes remote rows to the libSQL store for their table.
///
/// Each known table decodes into its own record type; unknown tables are ignored.
pub struct EntityRegistry<'a> {
    conn: &'a Connection,
}

impl<'a> EntityRegistry<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Merge `rows` into `table`. Returns `None` when the table is unknown.
    pub async fn apply_group(&self, table: &str, rows: &[Value]) -> Result<Option<ApplyCounts>> {
        let Some(table) = EntityTable::from_name(table) else {
            debug!(table, rows = rows.len(), "Ignoring change group for unknown table");
            return Ok(None);
        };

        let counts = match table {
            EntityTable::Transactions => self.apply_rows::<Transaction>(rows).await?,
            EntityTable::Accounts => self.apply_rows::<Account>(rows).await?,
            EntityTable::Categories => self.apply_rows::<Category>(rows).await?,
            EntityTable::Budgets => self.apply_rows::<Budget>(rows).await?,
            EntityTable::Tasks => self.apply_rows::<Task>(rows).await?,
            EntityTable::Habits => self.apply_rows::<Habit>(rows).await?,
            EntityTable::HabitRecords => self.apply_rows::<HabitRecord>(rows).await?,
            EntityTable::Countdowns => self.apply_rows::<Countdown>(rows).await?,
            EntityTable::SavingsGoals => self.apply_rows::<SavingsGoal>(rows).await?,
            EntityTable::SavingsContributions => {
                self.apply_rows::<SavingsContribution>(rows).await?
            }
            EntityTable::RecurringTransactions => {
                self.apply_rows::<RecurringTransaction>(rows).await?
            }
        };
        Ok(Some(counts))
    }

    /// Stored records of `table` as JSON, most recent first
    pub async fn list_json(&self, table: EntityTable, limit: usize) -> Result<Vec<Value>> {
        match table {
            EntityTable::Transactions => self.list_rows::<Transaction>(limit).await,
            EntityTable::Accounts => self.list_rows::<Account>(limit).await,
            EntityTable::Categories => self.list_rows::<Category>(limit).await,
            EntityTable::Budgets => self.list_rows::<Budget>(limit).await,
            EntityTable::Tasks => self.list_rows::<Task>(limit).await,
            EntityTable::Habits => self.list_rows::<Habit>(limit).await,
            EntityTable::HabitRecords => self.list_rows::<HabitRecord>(limit).await,
            EntityTable::Countdowns => self.list_rows::<Countdown>(limit).await,
            EntityTable::SavingsGoals => self.list_rows::<SavingsGoal>(limit).await,
            EntityTable::SavingsContributions => {
                self.list_rows::<SavingsContribution>(limit).await
            }
            EntityTable::RecurringTransactions => {
                self.list_rows::<RecurringTransaction>(limit).await
            }
        }
    }

    async fn apply_rows<E: SyncEntity>(&self, rows: &[Value]) -> Result<ApplyCounts> {
        let store = LibSqlEntityRepository::<E>::new(self.conn);
        let mut counts = ApplyCounts::default();

        for row in rows {
            let record = match serde_json::from_value::<E>(row.clone()) {
                Ok(record) => record,
                Err(error) => {
                    let id = row
                        .get("id")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("<missing>");
                    warn!(
                        table = E::TABLE.name(),
                        id,
                        %error,
                        "Skipping remote row that does not match the table schema"
                    );
                    counts.skipped += 1;
                    continue;
                }
            };
            counts.record(store.apply_incoming(record).await?);
        }

        debug!(
            table = E::TABLE.name(),
            inserted = counts.inserted,
            updated = counts.updated,
            discarded = counts.discarded,
            skipped = counts.skipped,
            "Applied change group"
        );
        Ok(counts)
    }

    async fn list_rows<E: SyncEntity>(&self, limit: usize) -> Result<Vec<Value>> {
        let store = LibSqlEntityRepository::<E>::new(self.conn);
        store
            .list(limit)
            .await?
            .iter()
            .map(|record| serde_json::to_value(record).map_err(Into::into))
            .collect()
    }
}
