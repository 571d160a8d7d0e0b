//! Session and checkpoint models

use serde::{Deserialize, Serialize};

/// Signed-in user on whose behalf the client syncs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Persisted sync cursor.
///
/// Only a fully successful run moves it forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Client time of the last completed download window (Unix ms), `0` before the first sync
    pub last_sync_time: i64,
    /// Server clock reported by the last upload, if any
    pub server_time: Option<i64>,
}
