//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `CHRONOQUERY_*` environment overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::ApiConfig;
use crate::client::{BackendSettings, DEFAULT_DATABASE, DEFAULT_MAX_CONCURRENCY, DEFAULT_TIMEOUT};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend datasource configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_url")]
    pub url: String,

    /// Bearer token, required
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Request the Arrow IPC endpoint instead of JSON
    #[serde(default = "default_true")]
    pub use_arrow: bool,

    #[serde(default = "default_split_duration")]
    pub split_duration: String,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Treat second-valued timestamps labelled as microseconds as seconds
    #[serde(default = "default_true")]
    pub correct_timestamp_units: bool,
}

fn default_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_true() -> bool {
    true
}

fn default_split_duration() -> String {
    "auto".to_string()
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_key: String::new(),
            database: default_database(),
            timeout_secs: default_timeout_secs(),
            use_arrow: true,
            split_duration: default_split_duration(),
            max_concurrency: default_max_concurrency(),
            correct_timestamp_units: true,
        }
    }
}

impl BackendConfig {
    /// Settings value the client and executor run with
    pub fn to_settings(&self) -> BackendSettings {
        BackendSettings::new(&self.url, &self.api_key)
            .database(&self.database)
            .timeout(Duration::from_secs(self.timeout_secs))
            .use_arrow(self.use_arrow)
            .split_duration(&self.split_duration)
            .max_concurrency(self.max_concurrency)
            .correct_timestamp_units(self.correct_timestamp_units)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        for path in default_paths() {
            if path.exists() {
                match Self::load_with_env(&path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply `CHRONOQUERY_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Values that fail to parse are
    /// ignored with a warning.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            let value = lookup(key)?;
            let parsed = value.parse().ok();
            if parsed.is_none() {
                tracing::warn!(key, value = %value, "Ignoring invalid environment override");
            }
            parsed
        }

        // Backend overrides
        if let Some(url) = lookup("CHRONOQUERY_URL") {
            self.backend.url = url;
        }
        if let Some(api_key) = lookup("CHRONOQUERY_API_KEY") {
            self.backend.api_key = api_key;
        }
        if let Some(database) = lookup("CHRONOQUERY_DATABASE") {
            self.backend.database = database;
        }
        if let Some(v) = parsed(&lookup, "CHRONOQUERY_TIMEOUT_SECS") {
            self.backend.timeout_secs = v;
        }
        if let Some(v) = parsed(&lookup, "CHRONOQUERY_USE_ARROW") {
            self.backend.use_arrow = v;
        }
        if let Some(split) = lookup("CHRONOQUERY_SPLIT_DURATION") {
            self.backend.split_duration = split;
        }
        if let Some(v) = parsed(&lookup, "CHRONOQUERY_MAX_CONCURRENCY") {
            self.backend.max_concurrency = v;
        }
        if let Some(v) = parsed(&lookup, "CHRONOQUERY_CORRECT_TIMESTAMP_UNITS") {
            self.backend.correct_timestamp_units = v;
        }

        // API overrides
        if let Some(host) = lookup("CHRONOQUERY_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = parsed(&lookup, "CHRONOQUERY_API_PORT") {
            self.api.port = port;
        }

        // Logging overrides
        if let Some(level) = lookup("CHRONOQUERY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("CHRONOQUERY_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Config file locations, in search order
pub fn default_paths() -> Vec<PathBuf> {
    [
        dirs::config_dir().map(|p| p.join("chronoquery").join("config.toml")),
        Some(PathBuf::from("/etc/chronoquery/config.toml")),
        Some(PathBuf::from("./config.toml")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Chronoquery Configuration
#
# Environment variables override these settings:
# - CHRONOQUERY_URL, CHRONOQUERY_API_KEY, CHRONOQUERY_DATABASE
# - CHRONOQUERY_TIMEOUT_SECS, CHRONOQUERY_USE_ARROW
# - CHRONOQUERY_SPLIT_DURATION, CHRONOQUERY_MAX_CONCURRENCY
# - CHRONOQUERY_CORRECT_TIMESTAMP_UNITS
# - CHRONOQUERY_API_HOST, CHRONOQUERY_API_PORT
# - CHRONOQUERY_LOG_LEVEL, CHRONOQUERY_LOG_FORMAT

[backend]
# Base URL of the query service
url = "http://localhost:8000"

# Bearer token (required)
api_key = ""

# Database sent with every query unless the query overrides it
database = "default"

# Per-request timeout in seconds
timeout_secs = 30

# Use the Arrow IPC endpoint (false: JSON)
use_arrow = true

# Query splitting: auto, off, 1h, 6h, 12h, 1d, 3d, 7d
split_duration = "auto"

# Maximum chunks in flight per query
max_concurrency = 4

# Read microsecond timestamps that look like seconds as seconds
correct_timestamp_units = true

[api]
# API server host
host = "127.0.0.1"

# API server port
port = 8090

# Maximum request body size (bytes)
max_body_size = 1048576

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config_round_trips() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[backend]
url = "https://arc.example.com"
api_key = "secret"
split_duration = "6h"
max_concurrency = 8

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.backend.url, "https://arc.example.com");
        assert_eq!(config.backend.database, "default");
        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(config.api.port, 8090);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");

        let settings = config.backend.to_settings();
        assert_eq!(settings.api_key, "secret");
        assert_eq!(settings.split_duration, "6h");
        assert_eq!(settings.max_concurrency, 8);
        assert_eq!(settings.timeout, Duration::from_secs(30));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_errors() {
        let err = Config::load(Path::new("/nonexistent/chronoquery.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[backend\nurl = ").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CHRONOQUERY_API_KEY", "from-env"),
            ("CHRONOQUERY_DATABASE", "logs"),
            ("CHRONOQUERY_TIMEOUT_SECS", "120"),
            ("CHRONOQUERY_USE_ARROW", "false"),
            ("CHRONOQUERY_MAX_CONCURRENCY", "lots"),
            ("CHRONOQUERY_API_PORT", "9000"),
            ("CHRONOQUERY_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.backend.api_key, "from-env");
        assert_eq!(config.backend.database, "logs");
        assert_eq!(config.backend.timeout_secs, 120);
        assert!(!config.backend.use_arrow);
        // Unparseable values leave the default in place
        assert_eq!(config.backend.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.api.port, 9000);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_missing_api_key_fails_validation() {
        let settings = Config::default().backend.to_settings();
        assert!(settings.validate().is_err());
    }
}
