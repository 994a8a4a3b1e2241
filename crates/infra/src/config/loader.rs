//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If the API key is not in the environment, falls back to a file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! Whatever the source, the result is checked with [`Config::validate`].
//!
//! ## Environment Variables
//! - `SENDGRID_API_KEY`: API key (required)
//! - `SGSYNC_BASE_URL`: API root
//! - `SGSYNC_REQUEST_TIMEOUT`: Per-request timeout in seconds
//! - `SGSYNC_CREATE_TIMEOUT`: Retry budget for creates in seconds
//! - `SGSYNC_UPDATE_TIMEOUT`: Retry budget for updates in seconds
//! - `SGSYNC_DELETE_TIMEOUT`: Retry budget for deletes in seconds
//! - `SGSYNC_LOG_LEVEL`: Default log filter
//! - `SGSYNC_LOG_JSON`: Emit JSON logs (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./sgsync.toml`, `./sgsync.json` (current working directory)
//! 2. `./config.toml`, `./config.json` (current working directory)
//! 3. The same names beside the executable

use std::path::{Path, PathBuf};

use sgsync_domain::{Config, Result, SgsyncError};

const API_KEY_VAR: &str = "SENDGRID_API_KEY";

const CONFIG_FILE_NAMES: [&str; 4] = ["sgsync.toml", "sgsync.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// The environment is used whenever `SENDGRID_API_KEY` is set; a bad value
/// in any other variable is then reported rather than skipped. Config files
/// are only probed when the key is absent.
///
/// # Errors
/// Returns `SgsyncError::Config` if:
/// - An environment value does not parse
/// - No config file is found when the key is absent
/// - File format is invalid
/// - The loaded configuration fails validation
pub fn load() -> Result<Config> {
    if optional_env(API_KEY_VAR).is_none() {
        tracing::debug!("{API_KEY_VAR} not set, trying config file");
        return load_from_file(None);
    }

    let config = load_from_env()?;
    tracing::info!("Configuration loaded from environment variables");
    Ok(config)
}

/// Load configuration from environment variables
///
/// Only the API key is required; every other setting keeps its default
/// when unset.
///
/// # Errors
/// Returns `SgsyncError::Config` if the key is missing or a value does not
/// parse.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::with_api_key(env_var(API_KEY_VAR)?);

    if let Some(base_url) = optional_env("SGSYNC_BASE_URL") {
        config.api.base_url = base_url;
    }
    if let Some(secs) = env_secs("SGSYNC_REQUEST_TIMEOUT")? {
        config.api.request_timeout_secs = secs;
    }
    if let Some(secs) = env_secs("SGSYNC_CREATE_TIMEOUT")? {
        config.retry.create_timeout_secs = secs;
    }
    if let Some(secs) = env_secs("SGSYNC_UPDATE_TIMEOUT")? {
        config.retry.update_timeout_secs = secs;
    }
    if let Some(secs) = env_secs("SGSYNC_DELETE_TIMEOUT")? {
        config.retry.delete_timeout_secs = secs;
    }
    if let Some(level) = optional_env("SGSYNC_LOG_LEVEL") {
        config.logging.level = level;
    }
    config.logging.json = env_bool("SGSYNC_LOG_JSON", config.logging.json);

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Format is detected by file extension.
///
/// # Errors
/// Returns `SgsyncError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - The loaded configuration fails validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(SgsyncError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            SgsyncError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| SgsyncError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content, by file extension
/// (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| SgsyncError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| SgsyncError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(SgsyncError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe the standard locations for a configuration file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }
    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir);
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    optional_env(key).ok_or_else(|| {
        SgsyncError::Config(format!("Missing required environment variable: {key}"))
    })
}

/// Environment variable, treating an empty value as unset.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_secs(key: &str) -> Result<Option<u64>> {
    optional_env(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|e| SgsyncError::Config(format!("Invalid {key} '{raw}': {e}")))
        })
        .transpose()
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use once_cell::sync::Lazy;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const ENV_KEYS: [&str; 8] = [
        "SENDGRID_API_KEY",
        "SGSYNC_BASE_URL",
        "SGSYNC_REQUEST_TIMEOUT",
        "SGSYNC_CREATE_TIMEOUT",
        "SGSYNC_UPDATE_TIMEOUT",
        "SGSYNC_DELETE_TIMEOUT",
        "SGSYNC_LOG_LEVEL",
        "SGSYNC_LOG_JSON",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    fn temp_config(contents: &str, extension: &str) -> (NamedTempFile, PathBuf) {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        let path = temp_file.path().with_extension(extension);
        std::fs::copy(temp_file.path(), &path).unwrap();
        (temp_file, path)
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        std::env::set_var("SGSYNC_TEST_BOOL_YES", "yes");
        std::env::set_var("SGSYNC_TEST_BOOL_UPPER", "TRUE");
        std::env::set_var("SGSYNC_TEST_BOOL_OFF", "off");

        assert!(env_bool("SGSYNC_TEST_BOOL_YES", false));
        assert!(env_bool("SGSYNC_TEST_BOOL_UPPER", false));
        assert!(!env_bool("SGSYNC_TEST_BOOL_OFF", true));

        std::env::remove_var("SGSYNC_TEST_BOOL_MISSING");
        assert!(env_bool("SGSYNC_TEST_BOOL_MISSING", true));

        std::env::remove_var("SGSYNC_TEST_BOOL_YES");
        std::env::remove_var("SGSYNC_TEST_BOOL_UPPER");
        std::env::remove_var("SGSYNC_TEST_BOOL_OFF");
    }

    #[test]
    fn test_load_from_env_only_key_set() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("SENDGRID_API_KEY", "SG.env-key");

        let config = load_from_env().expect("config from env");
        assert_eq!(config.api.api_key, "SG.env-key");
        assert_eq!(config.api.base_url, sgsync_domain::DEFAULT_BASE_URL);
        assert_eq!(config.retry.create_timeout_secs, 1200);
        assert_eq!(config.logging.level, "info");

        clear_env();
    }

    #[test]
    fn test_load_from_env_overrides() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("SENDGRID_API_KEY", "SG.env-key");
        std::env::set_var("SGSYNC_BASE_URL", "http://localhost:8080/v3");
        std::env::set_var("SGSYNC_REQUEST_TIMEOUT", "5");
        std::env::set_var("SGSYNC_CREATE_TIMEOUT", "60");
        std::env::set_var("SGSYNC_UPDATE_TIMEOUT", "61");
        std::env::set_var("SGSYNC_DELETE_TIMEOUT", "62");
        std::env::set_var("SGSYNC_LOG_LEVEL", "debug");
        std::env::set_var("SGSYNC_LOG_JSON", "true");

        let config = load_from_env().expect("config from env");
        assert_eq!(config.api.base_url, "http://localhost:8080/v3");
        assert_eq!(config.api.request_timeout_secs, 5);
        assert_eq!(config.retry.create_timeout_secs, 60);
        assert_eq!(config.retry.update_timeout_secs, 61);
        assert_eq!(config.retry.delete_timeout_secs, 62);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);

        clear_env();
    }

    #[test]
    fn test_load_from_env_missing_key() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        let err = load_from_env().unwrap_err();
        assert!(matches!(err, SgsyncError::Config(msg) if msg.contains("SENDGRID_API_KEY")));
    }

    #[test]
    fn test_load_from_env_invalid_number() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("SENDGRID_API_KEY", "SG.env-key");
        std::env::set_var("SGSYNC_CREATE_TIMEOUT", "soon");

        let err = load_from_env().unwrap_err();
        assert!(matches!(
            err,
            SgsyncError::Config(msg) if msg.contains("SGSYNC_CREATE_TIMEOUT")
        ));

        clear_env();
    }

    #[test]
    fn test_load_reports_bad_env_value_without_file_fallback() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("SENDGRID_API_KEY", "SG.env-key");
        std::env::set_var("SGSYNC_REQUEST_TIMEOUT", "30s");

        let err = load().unwrap_err();
        assert!(matches!(
            err,
            SgsyncError::Config(ref msg) if msg.contains("SGSYNC_REQUEST_TIMEOUT")
        ));
        assert!(!err.to_string().contains("No config file found"));

        clear_env();
    }

    #[test]
    fn test_load_from_env_zero_timeout_fails_validation() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();
        std::env::set_var("SENDGRID_API_KEY", "SG.env-key");
        std::env::set_var("SGSYNC_DELETE_TIMEOUT", "0");

        assert!(load_from_env().is_err());

        clear_env();
    }

    #[test]
    fn test_load_from_file_toml() {
        let (_temp, path) = temp_config(
            r#"
[api]
api_key = "SG.file-key"
base_url = "https://api.example.test/v3"

[retry]
update_timeout_secs = 90
jitter = false
"#,
            "toml",
        );

        let config = load_from_file(Some(path.clone())).expect("config from toml");
        assert_eq!(config.api.api_key, "SG.file-key");
        assert_eq!(config.api.base_url, "https://api.example.test/v3");
        assert_eq!(config.retry.update_timeout_secs, 90);
        assert_eq!(config.retry.create_timeout_secs, 1200);
        assert!(!config.retry.jitter);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_from_file_json() {
        let (_temp, path) = temp_config(
            r#"{"api": {"api_key": "SG.json-key"}, "logging": {"json": true}}"#,
            "json",
        );

        let config = load_from_file(Some(path.clone())).expect("config from json");
        assert_eq!(config.api.api_key, "SG.json-key");
        assert!(config.logging.json);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_from_file_validates() {
        let (_temp, path) = temp_config(
            "[api]\napi_key = \"k\"\n\n[retry]\ninitial_backoff_ms = 20000\nmax_backoff_ms = 100\n",
            "toml",
        );

        let err = load_from_file(Some(path.clone())).unwrap_err();
        assert!(matches!(err, SgsyncError::Config(msg) if msg.contains("exceeds max backoff")));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_from_file_not_found() {
        let err = load_from_file(Some(PathBuf::from("/nonexistent/sgsync.toml"))).unwrap_err();
        assert!(matches!(err, SgsyncError::Config(_)));
    }

    #[test]
    fn test_parse_config_unsupported_format() {
        let result = parse_config("api:\n  api_key: k\n", &PathBuf::from("sgsync.yaml"));
        assert!(result.is_err(), "Should fail with unsupported format");
    }

    #[test]
    fn test_parse_config_missing_key_in_file() {
        let result = parse_config("[retry]\njitter = false\n", &PathBuf::from("sgsync.toml"));
        assert!(matches!(result, Err(SgsyncError::Config(msg)) if msg.starts_with("Invalid TOML")));
    }
}
