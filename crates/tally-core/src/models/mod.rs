//! Data models for Tally

mod change_log;
mod entity;
mod ledger;
mod planner;
mod session;

pub use change_log::{ChangeLogEntry, ChangeStatus, Operation};
pub use entity::{EntityTable, SyncEntity, SyncStatus};
pub use ledger::{
    Account, Budget, Category, RecurringTransaction, SavingsContribution, SavingsGoal, Transaction,
};
pub use planner::{Countdown, Habit, HabitRecord, Task};
pub use session::{Checkpoint, User};
