//! Shared contract for synchronized record types

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Per-record sync marker carried by every entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Created locally, never uploaded
    #[default]
    PendingSync,
    /// Matches the server copy
    Synced,
    /// Changed locally after the last sync
    Modified,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingSync => "PENDING_SYNC",
            Self::Synced => "SYNCED",
            Self::Modified => "MODIFIED",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_SYNC" => Ok(Self::PendingSync),
            "SYNCED" => Ok(Self::Synced),
            "MODIFIED" => Ok(Self::Modified),
            other => Err(format!("unknown sync status '{other}'")),
        }
    }
}

/// Every table the sync protocol knows about, keyed by its wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityTable {
    Transactions,
    Accounts,
    Categories,
    Budgets,
    Tasks,
    Habits,
    HabitRecords,
    Countdowns,
    SavingsGoals,
    SavingsContributions,
    RecurringTransactions,
}

impl EntityTable {
    pub const ALL: [Self; 11] = [
        Self::Transactions,
        Self::Accounts,
        Self::Categories,
        Self::Budgets,
        Self::Tasks,
        Self::Habits,
        Self::HabitRecords,
        Self::Countdowns,
        Self::SavingsGoals,
        Self::SavingsContributions,
        Self::RecurringTransactions,
    ];

    /// Wire and SQL table name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Transactions => "transactions",
            Self::Accounts => "accounts",
            Self::Categories => "categories",
            Self::Budgets => "budgets",
            Self::Tasks => "tasks",
            Self::Habits => "habits",
            Self::HabitRecords => "habit_records",
            Self::Countdowns => "countdowns",
            Self::SavingsGoals => "savings_goals",
            Self::SavingsContributions => "savings_contributions",
            Self::RecurringTransactions => "recurring_transactions",
        }
    }

    /// Look up a table by wire name. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|table| table.name() == name)
    }
}

impl fmt::Display for EntityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Contract every synchronized record type fulfils.
///
/// `recency` is the field last-write-wins compares: `updatedAt` for mutable
/// records, `createdAt` for append-only ones.
pub trait SyncEntity:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
    const TABLE: EntityTable;

    fn id(&self) -> &str;

    fn recency(&self) -> i64;

    fn sync_status(&self) -> SyncStatus;

    fn set_sync_status(&mut self, status: SyncStatus);

    /// Force the record into the synced state
    fn mark_synced(&mut self) {
        self.set_sync_status(SyncStatus::Synced);
    }
}

/// Implements [`SyncEntity`] for a record struct with `id` and `sync_status` fields.
macro_rules! impl_sync_entity {
    ($ty:ty, $table:expr, $recency:ident) => {
        impl $crate::models::SyncEntity for $ty {
            const TABLE: $crate::models::EntityTable = $table;

            fn id(&self) -> &str {
                &self.id
            }

            fn recency(&self) -> i64 {
                self.$recency
            }

            fn sync_status(&self) -> $crate::models::SyncStatus {
                self.sync_status
            }

            fn set_sync_status(&mut self, status: $crate::models::SyncStatus) {
                self.sync_status = status;
            }
        }
    };
}

pub(crate) use impl_sync_entity;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_name_covers_every_table() {
        for table in EntityTable::ALL {
            assert_eq!(EntityTable::from_name(table.name()), Some(table));
        }
    }

    #[test]
    fn from_name_rejects_unknown_tables() {
        assert_eq!(EntityTable::from_name("credit_card_bills"), None);
        assert_eq!(EntityTable::from_name("Transactions"), None);
    }

    #[test]
    fn sync_status_defaults_to_pending() {
        assert_eq!(SyncStatus::default(), SyncStatus::PendingSync);
        assert_eq!(
            serde_json::to_string(&SyncStatus::PendingSync).unwrap(),
            "\"PENDING_SYNC\""
        );
    }
}
