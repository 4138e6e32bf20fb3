//! Query model
//!
//! A `QuerySpec` is what the host sends for one panel query. Field names
//! follow the host's camelCase JSON.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// How the result is meant to be displayed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryFormat {
    Table,
    /// Anything other than `table` is charted as a time series
    #[default]
    #[serde(other)]
    TimeSeries,
}

/// One logical query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    /// Opaque id used to key the response
    #[serde(default)]
    pub ref_id: String,

    /// SQL template, may contain `$__` macros
    #[serde(default)]
    pub sql: String,

    /// SQL carried over from other SQL datasources, used when `sql` is empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw_sql: String,

    /// Per-query database override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    #[serde(default)]
    pub format: QueryFormat,

    /// `auto`, `off` or one of `1h,6h,12h,1d,3d,7d`; absent uses the default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_duration: Option<String>,
}

impl QuerySpec {
    /// Create a time-series query
    pub fn new(ref_id: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            ref_id: ref_id.into(),
            sql: sql.into(),
            ..Default::default()
        }
    }

    /// Set the result format
    pub fn format(mut self, format: QueryFormat) -> Self {
        self.format = format;
        self
    }

    /// Override the database for this query
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Override the split setting for this query
    pub fn split_duration(mut self, split: impl Into<String>) -> Self {
        self.split_duration = Some(split.into());
        self
    }

    /// SQL to run, falling back to `rawSql`
    pub fn effective_sql(&self) -> &str {
        if self.sql.is_empty() {
            &self.raw_sql
        } else {
            &self.sql
        }
    }

    /// Database override, ignoring empty strings
    pub fn database_override(&self) -> Option<&str> {
        self.database.as_deref().filter(|db| !db.is_empty())
    }

    /// Split setting for this query, or `default` when unset
    pub fn split_setting(&self, default: &str) -> SplitSetting {
        match self.split_duration.as_deref() {
            Some(s) if !s.is_empty() => SplitSetting::parse(s),
            _ => SplitSetting::parse(default),
        }
    }
}

/// Parsed split-duration setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitSetting {
    /// Chunk size chosen from the range length
    Auto,
    /// Never split
    Off,
    /// Always split into chunks of this size
    Fixed(Duration),
}

impl SplitSetting {
    /// Parse a setting string. Unrecognised values disable splitting.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "" | "auto" => SplitSetting::Auto,
            "off" => SplitSetting::Off,
            "1h" => SplitSetting::Fixed(Duration::hours(1)),
            "6h" => SplitSetting::Fixed(Duration::hours(6)),
            "12h" => SplitSetting::Fixed(Duration::hours(12)),
            "1d" => SplitSetting::Fixed(Duration::days(1)),
            "3d" => SplitSetting::Fixed(Duration::days(3)),
            "7d" => SplitSetting::Fixed(Duration::days(7)),
            other => {
                tracing::warn!(split_duration = %other, "Unrecognised split duration, splitting disabled");
                SplitSetting::Off
            }
        }
    }
}
