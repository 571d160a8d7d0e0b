//! Sync configuration shared by every client.
//!
//! `SyncSettings` is persisted by clients (the CLI stores it as JSON) and can be
//! overridden from the environment. Credentials are never stored here.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sync::BackoffPolicy;
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 15 * 60;
const DEFAULT_FLEX_INTERVAL_SECS: u64 = 5 * 60;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_INITIAL_SECS: u64 = 10;
const DEFAULT_BACKOFF_MAX_SECS: u64 = 5 * 60 * 60;
const DEFAULT_TRIGGER_DEBOUNCE_MS: u64 = 5_000;

/// Tunables for the sync engine and its scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SyncSettings {
    /// Base URL of the sync API, e.g. `https://api.example.com/v1`
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Maximum number of change log entries uploaded per run
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    /// Window within the interval in which a periodic run may start
    #[serde(default = "default_flex_interval_secs")]
    pub flex_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Attempts (including the first) before a retryable failure becomes final
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_backoff_initial_secs")]
    pub backoff_initial_secs: u64,
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
    /// Manual sync requests closer together than this are dropped
    #[serde(default = "default_trigger_debounce_ms")]
    pub trigger_debounce_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_base_url: None,
            batch_size: DEFAULT_BATCH_SIZE,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            flex_interval_secs: DEFAULT_FLEX_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            backoff_initial_secs: DEFAULT_BACKOFF_INITIAL_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            trigger_debounce_ms: DEFAULT_TRIGGER_DEBOUNCE_MS,
        }
    }
}

impl SyncSettings {
    /// Apply `TALLY_API_BASE_URL`, `TALLY_SYNC_BATCH_SIZE` and
    /// `TALLY_SYNC_INTERVAL_SECS` on top of the current values.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Same as [`SyncSettings::with_env_overrides`] with an injectable lookup.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = normalize_text_option(lookup("TALLY_API_BASE_URL")) {
            self.api_base_url = Some(url);
        }
        if let Some(size) = lookup("TALLY_SYNC_BATCH_SIZE").and_then(|raw| raw.trim().parse().ok())
        {
            self.batch_size = size;
        }
        if let Some(secs) =
            lookup("TALLY_SYNC_INTERVAL_SECS").and_then(|raw| raw.trim().parse().ok())
        {
            self.sync_interval_secs = secs;
        }
        self
    }

    /// Check the values a sync run depends on.
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be greater than zero".to_string());
        }
        if self.sync_interval_secs == 0 {
            return Err("sync_interval_secs must be greater than zero".to_string());
        }
        if self.max_retry_attempts == 0 {
            return Err("max_retry_attempts must be greater than zero".to_string());
        }
        if let Some(url) = self.api_base_url.as_deref() {
            if !is_http_url(url.trim()) {
                return Err("api_base_url must include http:// or https://".to_string());
            }
        }
        Ok(())
    }

    /// Normalized API base URL without a trailing slash
    pub fn api_base_url(&self) -> Option<String> {
        normalize_text_option(self.api_base_url.clone())
            .map(|url| url.trim_end_matches('/').to_string())
    }

    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub const fn flex_interval(&self) -> Duration {
        Duration::from_secs(self.flex_interval_secs)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn trigger_debounce(&self) -> Duration {
        Duration::from_millis(self.trigger_debounce_ms)
    }

    pub const fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::Exponential {
            initial: Duration::from_secs(self.backoff_initial_secs),
            max: Duration::from_secs(self.backoff_max_secs),
        }
    }
}

const fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

const fn default_sync_interval_secs() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

const fn default_flex_interval_secs() -> u64 {
    DEFAULT_FLEX_INTERVAL_SECS
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_max_retry_attempts() -> u32 {
    DEFAULT_MAX_RETRY_ATTEMPTS
}

const fn default_backoff_initial_secs() -> u64 {
    DEFAULT_BACKOFF_INITIAL_SECS
}

const fn default_backoff_max_secs() -> u64 {
    DEFAULT_BACKOFF_MAX_SECS
}

const fn default_trigger_debounce_ms() -> u64 {
    DEFAULT_TRIGGER_DEBOUNCE_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_json_yields_defaults() {
        let settings: SyncSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, SyncSettings::default());
        assert_eq!(settings.batch_size, 100);
        assert_eq!(settings.sync_interval(), Duration::from_secs(900));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = serde_json::from_str::<SyncSettings>(r#"{"batchsize": 5}"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn env_overrides_apply() {
        let env = HashMap::from([
            ("TALLY_API_BASE_URL", " https://api.example.com/v1/ "),
            ("TALLY_SYNC_BATCH_SIZE", "25"),
            ("TALLY_SYNC_INTERVAL_SECS", "not-a-number"),
        ]);

        let settings = SyncSettings::default()
            .with_overrides(|key| env.get(key).map(ToString::to_string));

        assert_eq!(settings.batch_size, 25);
        assert_eq!(settings.sync_interval_secs, 900);
        assert_eq!(
            settings.api_base_url().as_deref(),
            Some("https://api.example.com/v1")
        );
    }

    #[test]
    fn validate_rejects_bad_values() {
        let zero_batch = SyncSettings {
            batch_size: 0,
            ..SyncSettings::default()
        };
        assert!(zero_batch.validate().is_err());

        let bad_url = SyncSettings {
            api_base_url: Some("api.example.com".to_string()),
            ..SyncSettings::default()
        };
        assert!(bad_url.validate().is_err());

        assert!(SyncSettings::default().validate().is_ok());
    }
}
