//! Planner records: tasks, habits, habit check-ins and countdowns

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::impl_sync_entity;
use super::{EntityTable, SyncStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_at: Option<i64>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<i64>,
    #[serde(default)]
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_sync_entity!(Task, EntityTable::Tasks, updated_at);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// `DAILY`, `WEEKLY` or `MONTHLY`
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub target: i32,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_sync_entity!(Habit, EntityTable::Habits, updated_at);

/// One day's check-in against a habit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitRecord {
    pub id: String,
    #[serde(default)]
    pub habit_id: String,
    /// Start of the recorded day (Unix ms)
    #[serde(default)]
    pub record_date: i64,
    #[serde(default)]
    pub count: i32,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_sync_entity!(HabitRecord, EntityTable::HabitRecords, updated_at);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Countdown {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub target_date: i64,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_sync_entity!(Countdown, EntityTable::Countdowns, updated_at);
