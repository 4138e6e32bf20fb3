//! Backend connection settings

use std::time::Duration;

use super::error::{ClientError, ClientResult};

/// Default database selected when none is configured
pub const DEFAULT_DATABASE: &str = "default";

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of chunk queries in flight at once
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Connection settings for one request.
///
/// Settings are never mutated once handed to a query. Per-query overrides
/// produce a new value through the `with_*` methods.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSettings {
    /// Base URL, e.g. `http://localhost:8000`
    pub url: String,
    /// Bearer credential
    pub api_key: String,
    /// Database selector sent with every request
    pub database: String,
    pub timeout: Duration,
    /// Use the Arrow IPC endpoint instead of JSON
    pub use_arrow: bool,
    /// Default split setting (`auto`, `off`, `1h`, ...)
    pub split_duration: String,
    /// Upper bound on concurrent chunk queries
    pub max_concurrency: usize,
    /// Reinterpret implausibly small microsecond timestamps as seconds
    pub correct_timestamp_units: bool,
}

impl BackendSettings {
    /// Settings with defaults for everything but the URL and credential
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            database: DEFAULT_DATABASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
            use_arrow: true,
            split_duration: "auto".to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            correct_timestamp_units: true,
        }
    }

    /// Set the database
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Choose between the Arrow and JSON endpoints
    pub fn use_arrow(mut self, use_arrow: bool) -> Self {
        self.use_arrow = use_arrow;
        self
    }

    /// Set the default split setting
    pub fn split_duration(mut self, split: impl Into<String>) -> Self {
        self.split_duration = split.into();
        self
    }

    /// Set the concurrency bound (at least 1)
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Enable or disable the timestamp unit correction
    pub fn correct_timestamp_units(mut self, enabled: bool) -> Self {
        self.correct_timestamp_units = enabled;
        self
    }

    /// Copy of these settings targeting another database
    pub fn with_database(&self, database: &str) -> Self {
        Self {
            database: database.to_string(),
            ..self.clone()
        }
    }

    /// Check the settings are usable
    pub fn validate(&self) -> ClientResult<()> {
        if self.api_key.is_empty() {
            return Err(ClientError::MissingApiKey);
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ClientError::InvalidSettings(format!(
                "URL must start with http:// or https://, got '{}'",
                self.url
            )));
        }
        Ok(())
    }

    /// Full URL for an API path
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = BackendSettings::new("http://localhost:8000", "key");
        assert_eq!(settings.database, "default");
        assert_eq!(settings.timeout, Duration::from_secs(30));
        assert!(settings.use_arrow);
        assert_eq!(settings.split_duration, "auto");
        assert_eq!(settings.max_concurrency, 4);
    }

    #[test]
    fn test_with_database_leaves_original() {
        let shared = BackendSettings::new("http://localhost:8000", "key").database("metrics");
        let overridden = shared.with_database("logs");

        assert_eq!(shared.database, "metrics");
        assert_eq!(overridden.database, "logs");
        assert_eq!(overridden.api_key, shared.api_key);
    }

    #[test]
    fn test_validate() {
        assert!(matches!(
            BackendSettings::new("http://localhost:8000", "").validate(),
            Err(ClientError::MissingApiKey)
        ));
        assert!(matches!(
            BackendSettings::new("localhost:8000", "key").validate(),
            Err(ClientError::InvalidSettings(_))
        ));
        assert!(BackendSettings::new("https://arc.example.com", "key")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_endpoint_and_concurrency_floor() {
        let settings = BackendSettings::new("http://localhost:8000/", "key").max_concurrency(0);
        assert_eq!(
            settings.endpoint("/api/v1/query"),
            "http://localhost:8000/api/v1/query"
        );
        assert_eq!(settings.max_concurrency, 1);
    }
}
