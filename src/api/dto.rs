//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! Field names follow the host's camelCase JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::query::{DataResponse, HealthStatus, QuerySpec};

// ============================================
// QUERY DTOs
// ============================================

/// Batch query request
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    /// Default time range for every query
    pub range: TimeRangeDto,
    /// Queries to run, keyed in the response by ref id
    pub queries: Vec<QueryDto>,
}

/// One query of a batch
#[derive(Debug, Deserialize)]
pub struct QueryDto {
    #[serde(flatten)]
    pub spec: QuerySpec,
    /// Overrides the request range for this query
    #[serde(default)]
    pub range: Option<TimeRangeDto>,
}

/// Time range specification
#[derive(Debug, Clone, Deserialize)]
pub struct TimeRangeDto {
    /// Start time (epoch millis, RFC 3339 or relative like "now-7d")
    pub from: String,
    /// End time (epoch millis, RFC 3339 or "now")
    pub to: String,
}

/// Batch query response
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub results: BTreeMap<String, DataResponse>,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Backend health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub message: String,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}
