//! Ledger records: transactions, accounts, categories, budgets, savings and recurring rules

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::impl_sync_entity;
use super::{EntityTable, SyncStatus};

/// A single income or expense booking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub category_id: Option<String>,
    /// `INCOME`, `EXPENSE` or `TRANSFER`
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub amount_cents: i64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub transaction_date: Option<i64>,
    #[serde(default)]
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub sync_status: SyncStatus,
    /// Fields this client does not model, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_sync_entity!(Transaction, EntityTable::Transactions, updated_at);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub balance_cents: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub is_default: bool,
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

impl_sync_entity!(Account, EntityTable::Accounts, updated_at);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub order_index: i64,
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

impl_sync_entity!(Category, EntityTable::Categories, updated_at);

/// Monthly spending limit, optionally scoped to a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub month: i32,
    #[serde(default)]
    pub budget_amount_cents: i64,
    #[serde(default)]
    pub alert_threshold: Option<f64>,
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

impl_sync_entity!(Budget, EntityTable::Budgets, updated_at);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsGoal {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub target_amount: f64,
    #[serde(default)]
    pub current_amount: f64,
    #[serde(default)]
    pub target_date: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_sync_entity!(SavingsGoal, EntityTable::SavingsGoals, updated_at);

/// Deposit into or withdrawal from a savings goal.
///
/// Contributions are append-only, so `createdAt` is their recency field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsContribution {
    pub id: String,
    #[serde(default)]
    pub goal_id: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub note: Option<String>,
    pub created_at: i64,
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_sync_entity!(
    SavingsContribution,
    EntityTable::SavingsContributions,
    created_at
);

/// Rule that books a transaction on a repeating schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringTransaction {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub amount_cents: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub note: Option<String>,
    /// `DAILY`, `WEEKLY`, `MONTHLY` or `YEARLY`
    #[serde(default)]
    pub frequency: String,
    #[serde(default)]
    pub day_of_week: Option<i32>,
    #[serde(default)]
    pub day_of_month: Option<i32>,
    #[serde(default)]
    pub month_of_year: Option<i32>,
    #[serde(default)]
    pub start_date: i64,
    #[serde(default)]
    pub end_date: Option<i64>,
    #[serde(default)]
    pub next_execution_date: Option<i64>,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    #[serde(default)]
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_sync_entity!(
    RecurringTransaction,
    EntityTable::RecurringTransactions,
    updated_at
);

const fn default_true() -> bool {
    true
}
