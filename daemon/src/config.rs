//! Daemon configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use settle_utils::LogFormat;
use settle_verification::VerificationConfig;

use crate::error::ConfigError;

/// Configuration for `settle-verify`.
///
/// Loaded from a TOML file via [`DaemonConfig::from_toml_file`]; every field
/// has a default so a partial (or empty) file is valid. CLI flags and
/// environment variables are applied on top by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// URL of the public chat feed (`GET`).
    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    /// Base URL of the verification authority.
    #[serde(default = "default_authority_url")]
    pub authority_url: String,

    /// Bearer token sent to the authority, if it requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_api_key: Option<String>,

    /// Per-request timeout for both HTTP clients, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Log output format: "human" or "json".
    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter (e.g. "info", "debug,settle_verification=trace").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Polling and countdown timers.
    #[serde(default)]
    pub verification: VerificationConfig,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_feed_url() -> String {
    "http://127.0.0.1:8080/chat/messages".to_string()
}

fn default_authority_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl DaemonConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// A copy safe to print: the API key, if any, is masked.
    pub fn redacted(&self) -> Self {
        Self {
            authority_api_key: self.authority_api_key.as_ref().map(|_| "<redacted>".to_string()),
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed_url.trim().is_empty() {
            return Err(ConfigError::Invalid("feed_url must not be empty".into()));
        }
        if self.authority_url.trim().is_empty() {
            return Err(ConfigError::Invalid("authority_url must not be empty".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than zero".into(),
            ));
        }
        self.verification
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            feed_url: default_feed_url(),
            authority_url: default_authority_url(),
            authority_api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            verification: VerificationConfig::default(),
        }
    }
}
