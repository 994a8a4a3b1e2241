//! Tracing subscriber setup
//!
//! Logs go to stderr so stdout stays free for command output. `RUST_LOG`,
//! when set, takes precedence over the configured level.

use sgsync_domain::{LoggingConfig, Result, SgsyncError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber described by `config`.
///
/// Calling this more than once is harmless: later calls leave the first
/// subscriber in place.
///
/// # Errors
/// Returns `SgsyncError::Config` if neither `RUST_LOG` nor the configured
/// level is a valid filter.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref(), &config.level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).try_init()
    } else {
        registry.with(fmt::layer().with_target(false).with_writer(std::io::stderr)).try_init()
    };

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
    Ok(())
}

fn build_filter(rust_log: Option<&str>, level: &str) -> Result<EnvFilter> {
    if let Some(directives) = rust_log.filter(|d| !d.trim().is_empty()) {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return Ok(filter);
        }
    }
    EnvFilter::try_new(level)
        .map_err(|e| SgsyncError::Config(format!("Invalid log level '{level}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_is_used_without_rust_log() {
        let filter = build_filter(None, "debug").unwrap();
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn rust_log_overrides_configured_level() {
        let filter = build_filter(Some("sgsync_core=trace"), "info").unwrap();
        assert_eq!(filter.to_string(), "sgsync_core=trace");
    }

    #[test]
    fn invalid_rust_log_falls_back_to_level() {
        let filter = build_filter(Some("sgsync_core=loud"), "warn").unwrap();
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn invalid_level_is_config_error() {
        let err = build_filter(None, "sgsync=loud").unwrap_err();
        assert!(matches!(err, SgsyncError::Config(msg) if msg.contains("sgsync=loud")));
    }

    #[test]
    fn init_is_idempotent() {
        let config = LoggingConfig::default();
        assert!(init_tracing(&config).is_ok());
        assert!(init_tracing(&LoggingConfig { json: true, ..config }).is_ok());
    }
}
