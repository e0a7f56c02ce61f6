//! Engine configuration.
//!
//! `EngineConfig` is read from a JSON file shipped with (or written by) the
//! host app, then selectively overridden from the environment. Every field has
//! a default so a partial or empty file is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::models::ConflictStrategy;
use crate::util::is_http_url;
use crate::{Error, Result};

pub const ENV_API_BASE_URL: &str = "FIELDSYNC_API_BASE_URL";
pub const ENV_MAX_RETRIES: &str = "FIELDSYNC_MAX_RETRIES";

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Retry backoff tuning, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
    /// Fixed jitter seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter_ms: 1_000,
            seed: None,
        }
    }
}

/// Runtime settings for the sync engine and its HTTP dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Base URL relative entity paths are joined to.
    pub api_base_url: String,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
    /// Failed attempts after which an item needs manual action.
    pub max_retries: u32,
    pub backoff: BackoffConfig,
    pub conflict_strategy: ConflictStrategy,
    /// Buffered events per subscriber before the slowest one lags.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: BackoffConfig::default(),
            conflict_strategy: ConflictStrategy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Parse a config from raw JSON.
    pub fn from_json(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|error| Error::InvalidInput(format!("invalid engine config JSON: {error}")))?;
        config.normalized()
    }

    /// Load a config file, apply environment overrides, and validate.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let payload = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&payload)?;
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `FIELDSYNC_*` overrides from `lookup`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = env_value(&lookup, ENV_API_BASE_URL) {
            self.api_base_url = url;
        }
        if let Some(raw) = env_value(&lookup, ENV_MAX_RETRIES) {
            self.max_retries = raw.parse().map_err(|_| {
                Error::InvalidInput(format!("{ENV_MAX_RETRIES} must be a non-negative integer"))
            })?;
        }
        self.normalized()
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !is_http_url(&self.api_base_url) {
            return Err(Error::InvalidInput(
                "api_base_url must include http:// or https://".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidInput(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.backoff.base_delay_ms > self.backoff.max_delay_ms {
            return Err(Error::InvalidInput(format!(
                "backoff base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.backoff.base_delay_ms, self.backoff.max_delay_ms
            )));
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidInput(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn normalized(mut self) -> Result<Self> {
        self.api_base_url = self.api_base_url.trim().trim_end_matches('/').to_string();
        self.validate()?;
        Ok(self)
    }
}

/// Blank variables count as unset.
fn env_value<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
