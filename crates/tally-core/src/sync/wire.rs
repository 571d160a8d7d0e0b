//! JSON shapes exchanged with the sync API.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::models::{ChangeLogEntry, Operation};

/// One change log entry as sent to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadItem {
    pub table: String,
    pub row_id: String,
    pub operation: Operation,
    /// Serialized record snapshot, forwarded untouched
    pub payload: String,
    pub timestamp: i64,
}

impl From<&ChangeLogEntry> for UploadItem {
    fn from(entry: &ChangeLogEntry) -> Self {
        Self {
            table: entry.table_name.clone(),
            row_id: entry.row_id.clone(),
            operation: entry.operation,
            payload: entry.payload.clone(),
            timestamp: entry.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub items: Vec<UploadItem>,
}

impl UploadRequest {
    pub fn from_entries(entries: &[ChangeLogEntry]) -> Self {
        Self {
            items: entries.iter().map(UploadItem::from).collect(),
        }
    }
}

/// Server decision for a conflicting row.
///
/// Values the client does not recognise are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Resolution {
    ServerWins,
    ClientWins,
    Merge,
    Other(String),
}

impl From<String> for Resolution {
    fn from(value: String) -> Self {
        match value.as_str() {
            "server_wins" => Self::ServerWins,
            "client_wins" => Self::ClientWins,
            "merge" => Self::Merge,
            _ => Self::Other(value),
        }
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        match value {
            Resolution::ServerWins => "server_wins".to_string(),
            Resolution::ClientWins => "client_wins".to_string(),
            Resolution::Merge => "merge".to_string(),
            Resolution::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictItem {
    pub table: String,
    pub row_id: String,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub conflicts: Vec<ConflictItem>,
    #[serde(default)]
    pub server_time: Option<i64>,
}

/// Remote rows for one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeGroup {
    pub table: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub rows: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangesResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub changes: Vec<ChangeGroup>,
}

/// Absent and `null` lists both mean "nothing".
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChangeStatus;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn upload_request_uses_wire_names() {
        let entry = ChangeLogEntry {
            id: 7,
            table_name: "transactions".to_string(),
            row_id: "t1".to_string(),
            operation: Operation::Update,
            payload: r#"{"id":"t1"}"#.to_string(),
            timestamp: 1_700,
            sync_status: ChangeStatus::Pending,
        };

        let body = serde_json::to_value(UploadRequest::from_entries(&[entry])).unwrap();
        assert_eq!(
            body,
            json!({
                "items": [{
                    "table": "transactions",
                    "rowId": "t1",
                    "operation": "UPDATE",
                    "payload": "{\"id\":\"t1\"}",
                    "timestamp": 1_700,
                }]
            })
        );
    }

    #[test]
    fn upload_response_defaults_and_resolutions() {
        let response: UploadResponse = serde_json::from_value(json!({
            "conflicts": [
                {"table": "transactions", "rowId": "t1", "resolution": "client_wins"},
                {"table": "transactions", "rowId": "t2", "resolution": "server_wins"},
                {"table": "accounts", "rowId": "a1", "resolution": "merge"},
                {"table": "accounts", "rowId": "a2", "resolution": "coin_flip"},
            ]
        }))
        .unwrap();

        let resolutions: Vec<Resolution> = response
            .conflicts
            .into_iter()
            .map(|conflict| conflict.resolution)
            .collect();
        assert_eq!(
            resolutions,
            vec![
                Resolution::ClientWins,
                Resolution::ServerWins,
                Resolution::Merge,
                Resolution::Other("coin_flip".to_string()),
            ]
        );
        assert_eq!(response.server_time, None);

        let empty: UploadResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, UploadResponse::default());
    }

    #[test]
    fn changes_response_tolerates_missing_fields() {
        let empty: ChangesResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.changes.is_empty());

        let response: ChangesResponse =
            serde_json::from_value(json!({"changes": [{"table": "accounts"}]})).unwrap();
        assert_eq!(response.changes[0].table, "accounts");
        assert!(response.changes[0].rows.is_empty());
    }

    #[test]
    fn null_lists_read_as_empty() {
        let response: ChangesResponse = serde_json::from_str(r#"{"changes": null}"#).unwrap();
        assert!(response.changes.is_empty());

        let response: ChangesResponse =
            serde_json::from_value(json!({"changes": [{"table": "tasks", "rows": null}]}))
                .unwrap();
        assert!(response.changes[0].rows.is_empty());

        let upload: UploadResponse =
            serde_json::from_str(r#"{"conflicts": null, "serverTime": 5}"#).unwrap();
        assert!(upload.conflicts.is_empty());
        assert_eq!(upload.server_time, Some(5));
    }
}
