//! Transport seam between the sync engine and the server.

use std::future::Future;
use std::sync::Arc;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use super::wire::{ChangesResponse, UploadRequest, UploadResponse};
use crate::util::compact_text;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid sync transport configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Sync HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Sync API error: {message} ({status})")]
    Status { status: u16, message: String },
    #[error("Invalid sync payload: {0}")]
    InvalidPayload(String),
}

impl TransportError {
    /// Build a status error from a non-success response body.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        Self::Status {
            status: status.as_u16(),
            message: parse_api_error(body),
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Server endpoints used by one sync run.
///
/// Futures are `Send` so a run can be spawned on the scheduler's runtime.
pub trait SyncTransport: Send + Sync {
    /// Send one batch of change log entries
    fn upload(
        &self,
        request: &UploadRequest,
    ) -> impl Future<Output = TransportResult<UploadResponse>> + Send;

    /// Fetch remote changes newer than `since` (Unix ms)
    fn fetch_changes(
        &self,
        since: i64,
    ) -> impl Future<Output = TransportResult<ChangesResponse>> + Send;
}

impl<T: SyncTransport> SyncTransport for Arc<T> {
    fn upload(
        &self,
        request: &UploadRequest,
    ) -> impl Future<Output = TransportResult<UploadResponse>> + Send {
        (**self).upload(request)
    }

    fn fetch_changes(
        &self,
        since: i64,
    ) -> impl Future<Output = TransportResult<ChangesResponse>> + Send {
        (**self).fetch_changes(since)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return compact_text(&message);
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_prefers_json_message() {
        let error = TransportError::from_response(
            StatusCode::UNAUTHORIZED,
            r#"{"error":"expired","message":"token expired"}"#,
        );
        assert_eq!(error.to_string(), "Sync API error: token expired (401)");
    }

    #[test]
    fn status_error_falls_back_to_body() {
        let error = TransportError::from_response(StatusCode::BAD_GATEWAY, "  upstream down ");
        assert_eq!(error.to_string(), "Sync API error: upstream down (502)");

        let error = TransportError::from_response(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert!(matches!(error, TransportError::Status { status: 500, .. }));
    }
}
