//! reqwest-backed sync transport.

use std::time::Duration;

use serde::de::DeserializeOwned;

use super::transport::{SyncTransport, TransportError, TransportResult};
use super::wire::{ChangesResponse, UploadRequest, UploadResponse};
use crate::config::SyncSettings;
use crate::util::{is_http_url, normalize_text_option};

const UPLOAD_PATH: &str = "/sync/upload";
const CHANGES_PATH: &str = "/sync/changes";

/// Talks to `{base}/sync/upload` and `{base}/sync/changes`
#[derive(Clone)]
pub struct HttpSyncTransport {
    base_url: String,
    bearer_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpSyncTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpSyncTransport")
            .field("base_url", &self.base_url)
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl HttpSyncTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> TransportResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            base_url,
            bearer_token: None,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    /// Build from settings; fails when no API base URL is configured.
    pub fn from_settings(
        settings: &SyncSettings,
        bearer_token: Option<String>,
    ) -> TransportResult<Self> {
        let base_url = settings.api_base_url().ok_or_else(|| {
            TransportError::InvalidConfiguration("api_base_url is not configured".to_string())
        })?;
        Ok(Self::new(base_url, settings.request_timeout())?.with_bearer_token(bearer_token))
    }

    #[must_use]
    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = normalize_text_option(token);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("Accept", "application/json");
        match self.bearer_token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_json<T: DeserializeOwned + Default>(
        response: reqwest::Response,
    ) -> TransportResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(TransportError::from_response(status, &body));
        }
        // An empty body means "nothing to report"
        if body.trim().is_empty() {
            return Ok(T::default());
        }
        serde_json::from_str(&body).map_err(|error| TransportError::InvalidPayload(error.to_string()))
    }
}

impl SyncTransport for HttpSyncTransport {
    async fn upload(&self, request: &UploadRequest) -> TransportResult<UploadResponse> {
        let url = format!("{}{UPLOAD_PATH}", self.base_url);
        let response = self
            .authorize(self.client.post(&url))
            .json(request)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn fetch_changes(&self, since: i64) -> TransportResult<ChangesResponse> {
        let url = format!("{}{CHANGES_PATH}", self.base_url);
        let response = self
            .authorize(self.client.get(&url))
            .query(&[("since", since)])
            .send()
            .await?;
        Self::read_json(response).await
    }
}

fn normalize_base_url(raw: String) -> TransportResult<String> {
    let base_url = normalize_text_option(Some(raw)).ok_or_else(|| {
        TransportError::InvalidConfiguration("base url must not be empty".to_string())
    })?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(TransportError::InvalidConfiguration(
            "base url must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url(String::new()).is_err());
        assert!(normalize_base_url("api.example.com".to_string()).is_err());
        assert_eq!(
            normalize_base_url(" https://api.example.com/v1/ ".to_string()).unwrap(),
            "https://api.example.com/v1"
        );
    }

    #[test]
    fn debug_redacts_token() {
        let transport = HttpSyncTransport::new("https://api.example.com", Duration::from_secs(5))
            .unwrap()
            .with_bearer_token(Some("secret".to_string()));
        let debug = format!("{transport:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn from_settings_requires_base_url() {
        let result = HttpSyncTransport::from_settings(&SyncSettings::default(), None);
        assert!(matches!(
            result,
            Err(TransportError::InvalidConfiguration(_))
        ));
    }
}
