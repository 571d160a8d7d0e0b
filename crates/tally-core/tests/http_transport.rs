use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tally_core::models::ChangeStatus;
use tally_core::sync::{
    HttpSyncTransport, Resolution, SyncTransport, TransportError, UploadRequest,
};
use tally_core::{ChangeLogEntry, Operation};

#[derive(Clone, Default)]
struct Captured {
    upload_bodies: Arc<Mutex<Vec<Value>>>,
    authorization: Arc<Mutex<Vec<Option<String>>>>,
    since: Arc<Mutex<Vec<String>>>,
}

async fn upload(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let auth = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);
    captured.authorization.lock().unwrap().push(auth);
    captured.upload_bodies.lock().unwrap().push(body);

    Json(json!({
        "conflicts": [
            { "table": "accounts", "rowId": "a1", "resolution": "client_wins" },
            { "table": "tasks", "rowId": "t9", "resolution": "custom_rule" }
        ],
        "serverTime": 1_700_000_000_500_i64
    }))
}

async fn changes(
    State(captured): State<Captured>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let since = params.get("since").cloned().unwrap_or_default();
    captured.since.lock().unwrap().push(since.clone());

    match since.as_str() {
        "0" => (
            StatusCode::OK,
            json!({
                "changes": [
                    { "table": "accounts", "rows": [{ "id": "a1" }] },
                    { "table": "unknown_table" }
                ]
            })
            .to_string(),
        ),
        "42" => (StatusCode::OK, String::new()),
        "43" => (StatusCode::OK, r#"{"changes": null}"#.to_string()),
        "500" => (StatusCode::OK, "not json".to_string()),
        _ => (
            StatusCode::UNAUTHORIZED,
            json!({ "error": "unauthorized", "message": " token expired " }).to_string(),
        ),
    }
}

async fn spawn_server() -> (String, Captured) {
    let captured = Captured::default();
    let app = Router::new()
        .route("/v1/sync/upload", post(upload))
        .route("/v1/sync/changes", get(changes))
        .with_state(captured.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (format!("http://{address}/v1/"), captured)
}

fn transport(base_url: &str, token: Option<&str>) -> HttpSyncTransport {
    HttpSyncTransport::new(base_url, Duration::from_secs(5))
        .unwrap()
        .with_bearer_token(token.map(ToString::to_string))
}

fn entry(id: i64, row_id: &str) -> ChangeLogEntry {
    ChangeLogEntry {
        id,
        table_name: "accounts".to_string(),
        row_id: row_id.to_string(),
        operation: Operation::Insert,
        payload: format!(r#"{{"id":"{row_id}"}}"#),
        timestamp: 1_000 + id,
        sync_status: ChangeStatus::Pending,
    }
}

#[tokio::test]
async fn upload_posts_items_with_bearer_token() {
    let (base_url, captured) = spawn_server().await;
    let transport = transport(&base_url, Some("secret-token"));

    let request = UploadRequest::from_entries(&[entry(1, "a1"), entry(2, "a2")]);
    let response = transport.upload(&request).await.unwrap();

    assert_eq!(response.server_time, Some(1_700_000_000_500));
    assert_eq!(response.conflicts.len(), 2);
    assert_eq!(response.conflicts[0].resolution, Resolution::ClientWins);
    assert_eq!(
        response.conflicts[1].resolution,
        Resolution::Other("custom_rule".to_string())
    );

    let bodies = captured.upload_bodies.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    assert_eq!(
        bodies[0]["items"][1],
        json!({
            "table": "accounts",
            "rowId": "a2",
            "operation": "INSERT",
            "payload": "{\"id\":\"a2\"}",
            "timestamp": 1_002,
        })
    );
    assert_eq!(
        captured.authorization.lock().unwrap().clone(),
        vec![Some("Bearer secret-token".to_string())]
    );
}

#[tokio::test]
async fn upload_without_token_sends_no_authorization() {
    let (base_url, captured) = spawn_server().await;
    let transport = transport(&base_url, Some("   "));

    transport
        .upload(&UploadRequest::from_entries(&[entry(1, "a1")]))
        .await
        .unwrap();

    assert_eq!(captured.authorization.lock().unwrap().clone(), vec![None]);
}

#[tokio::test]
async fn fetch_changes_passes_since_and_keeps_groups() {
    let (base_url, captured) = spawn_server().await;
    let transport = transport(&base_url, None);

    let response = transport.fetch_changes(0).await.unwrap();

    assert_eq!(captured.since.lock().unwrap().clone(), vec!["0".to_string()]);
    assert_eq!(response.changes.len(), 2);
    assert_eq!(response.changes[0].table, "accounts");
    assert_eq!(response.changes[0].rows, vec![json!({ "id": "a1" })]);
    assert!(response.changes[1].rows.is_empty());
}

#[tokio::test]
async fn empty_changes_body_means_no_changes() {
    let (base_url, _captured) = spawn_server().await;

    let response = transport(&base_url, None).fetch_changes(42).await.unwrap();
    assert!(response.changes.is_empty());
}

#[tokio::test]
async fn null_changes_list_means_no_changes() {
    let (base_url, _captured) = spawn_server().await;

    let response = transport(&base_url, None).fetch_changes(43).await.unwrap();
    assert!(response.changes.is_empty());
}

#[tokio::test]
async fn malformed_changes_body_is_invalid_payload() {
    let (base_url, _captured) = spawn_server().await;

    let error = transport(&base_url, None)
        .fetch_changes(500)
        .await
        .unwrap_err();
    assert!(matches!(error, TransportError::InvalidPayload(_)));
}

#[tokio::test]
async fn error_status_carries_server_message() {
    let (base_url, _captured) = spawn_server().await;

    let error = transport(&base_url, None)
        .fetch_changes(7)
        .await
        .unwrap_err();

    match error {
        TransportError::Status { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "token expired");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_server_is_an_http_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let error = transport(&format!("http://{address}"), None)
        .fetch_changes(0)
        .await
        .unwrap_err();
    assert!(matches!(error, TransportError::Http(_)));
}
