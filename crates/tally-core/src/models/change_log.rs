//! Change log model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of local mutation captured in the change log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    /// Wire/database representation
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(format!("unknown change operation '{other}'")),
        }
    }
}

/// Upload state of a change log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeStatus {
    Pending,
    Synced,
}

impl ChangeStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Synced => "SYNCED",
        }
    }
}

impl FromStr for ChangeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SYNCED" => Ok(Self::Synced),
            other => Err(format!("unknown change status '{other}'")),
        }
    }
}

/// A local mutation waiting to be (or already) uploaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// Change log row identifier, assigned by the store
    pub id: i64,
    /// Wire name of the mutated table
    pub table_name: String,
    /// Identifier of the mutated row within its table
    pub row_id: String,
    pub operation: Operation,
    /// Serialized snapshot of the record at mutation time
    pub payload: String,
    /// Mutation time (Unix ms)
    pub timestamp: i64,
    pub sync_status: ChangeStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_parses_case_insensitively() {
        assert_eq!("update".parse::<Operation>(), Ok(Operation::Update));
        assert_eq!(" DELETE ".parse::<Operation>(), Ok(Operation::Delete));
        assert!("upsert".parse::<Operation>().is_err());
    }

    #[test]
    fn operation_serializes_uppercase() {
        let json = serde_json::to_string(&Operation::Insert).unwrap();
        assert_eq!(json, "\"INSERT\"");
    }

    #[test]
    fn change_status_round_trips_through_str() {
        for status in [ChangeStatus::Pending, ChangeStatus::Synced] {
            assert_eq!(status.as_str().parse::<ChangeStatus>(), Ok(status));
        }
    }
}
