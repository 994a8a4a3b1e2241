//! Configuration management

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{Result, SgsyncError};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.sendgrid.com/v3";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    pub api: ApiConfig,
    /// Budgets and backoff for retried writes.
    #[serde(default)]
    pub retry: RetrySettings,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote API connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API root, including the version segment.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token. Never serialized.
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Overrides the default `sgsync/<version>` agent.
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl ApiConfig {
    /// Defaults around `api_key`.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: default_base_url(),
            api_key: api_key.into(),
            request_timeout_secs: default_request_timeout(),
            user_agent: None,
        }
    }

    /// Per-request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Retry budgets and backoff for rate-limited writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retry budget for a create, follow-up writes included.
    pub create_timeout_secs: u64,
    /// Retry budget for an update.
    pub update_timeout_secs: u64,
    /// Retry budget for a delete.
    pub delete_timeout_secs: u64,
    /// First backoff delay; doubles per retry.
    pub initial_backoff_ms: u64,
    /// Backoff cap.
    pub max_backoff_ms: u64,
    /// Randomize each delay within its upper half.
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            create_timeout_secs: 1200,
            update_timeout_secs: 1200,
            delete_timeout_secs: 1200,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            jitter: true,
        }
    }
}

impl RetrySettings {
    /// Create budget as a `Duration`.
    pub fn create_timeout(&self) -> Duration {
        Duration::from_secs(self.create_timeout_secs)
    }

    /// Update budget as a `Duration`.
    pub fn update_timeout(&self) -> Duration {
        Duration::from_secs(self.update_timeout_secs)
    }

    /// Delete budget as a `Duration`.
    pub fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_timeout_secs)
    }

    /// First backoff delay as a `Duration`.
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Backoff cap as a `Duration`.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Logging output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

impl Config {
    /// Config with every section defaulted around the given API key.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api: ApiConfig::new(api_key),
            retry: RetrySettings::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Check cross-field constraints that serde defaults cannot express.
    ///
    /// # Errors
    /// Returns `SgsyncError::Config` describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.api.api_key.trim().is_empty() {
            return Err(SgsyncError::Config("api key must not be empty".to_string()));
        }

        let url = Url::parse(&self.api.base_url).map_err(|e| {
            SgsyncError::Config(format!("Invalid base url '{}': {}", self.api.base_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SgsyncError::Config(format!(
                "Base url must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.api.request_timeout_secs == 0 {
            return Err(SgsyncError::Config("request timeout must be positive".to_string()));
        }

        let retry = &self.retry;
        if retry.create_timeout_secs == 0
            || retry.update_timeout_secs == 0
            || retry.delete_timeout_secs == 0
        {
            return Err(SgsyncError::Config("retry timeouts must be positive".to_string()));
        }
        if retry.initial_backoff_ms > retry.max_backoff_ms {
            return Err(SgsyncError::Config(format!(
                "initial backoff ({}ms) exceeds max backoff ({}ms)",
                retry.initial_backoff_ms, retry.max_backoff_ms
            )));
        }

        Ok(())
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [api]
            api_key = "SG.test"
            "#,
        )
        .unwrap();

        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api.request_timeout_secs, 30);
        assert_eq!(config.retry, RetrySettings::default());
        assert_eq!(config.retry.create_timeout(), Duration::from_secs(1200));
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn api_key_is_redacted_and_not_serialized() {
        let config = Config::with_api_key("SG.very-secret");
        assert!(!format!("{config:?}").contains("very-secret"));

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("very-secret"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::with_api_key("  ");
        assert!(matches!(config.validate(), Err(SgsyncError::Config(_))));

        config.api.api_key = "SG.key".to_string();
        config.api.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        config.api.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.api.base_url = DEFAULT_BASE_URL.to_string();
        config.retry.delete_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.retry.delete_timeout_secs = 60;
        config.retry.initial_backoff_ms = 20_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds max backoff"));
    }
}
