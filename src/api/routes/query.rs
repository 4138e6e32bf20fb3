//! Query Routes
//!
//! - POST /api/v1/query - Run a batch of queries

use axum::{extract::State, Json};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::api::dto::{QueryRequest, QueryResponse, TimeRangeDto};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::frame::TimeRange;
use crate::query::DataQuery;

/// POST /api/v1/query
///
/// Run every query of the batch and return frames (or an error) per ref id.
/// Dropping the request cancels any chunks still in flight.
pub async fn execute_query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> ApiResult<Json<QueryResponse>> {
    if req.queries.is_empty() {
        return Err(ApiError::Validation("queries cannot be empty".to_string()));
    }

    let now = Utc::now();
    let default_range = parse_time_range(&req.range, now)?;

    let mut queries = Vec::with_capacity(req.queries.len());
    for query in req.queries {
        if query.spec.ref_id.is_empty() {
            return Err(ApiError::Validation("refId is required".to_string()));
        }
        let range = match &query.range {
            Some(dto) => parse_time_range(dto, now)?,
            None => default_range,
        };
        queries.push(DataQuery {
            spec: query.spec,
            range,
        });
    }

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let results = state
        .executor
        .query_data(&state.settings, queries, &cancel)
        .await;

    Ok(Json(QueryResponse { results }))
}

/// Parse time range from DTO
fn parse_time_range(dto: &TimeRangeDto, now: DateTime<Utc>) -> ApiResult<TimeRange> {
    let from = parse_timestamp(&dto.from, now)?;
    let to = parse_timestamp(&dto.to, now)?;

    TimeRange::try_new(from, to)
        .ok_or_else(|| ApiError::Validation("from must not be after to".to_string()))
}

/// Parse a timestamp string
fn parse_timestamp(s: &str, now: DateTime<Utc>) -> ApiResult<DateTime<Utc>> {
    let invalid = || ApiError::Validation(format!("Cannot parse timestamp: {}", s));

    // Epoch milliseconds, as sent by most hosts
    if let Ok(ms) = s.parse::<i64>() {
        return DateTime::from_timestamp_millis(ms).ok_or_else(invalid);
    }

    if s.starts_with("now") {
        return parse_relative_time(s, now);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Without timezone, assume UTC
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.and_utc());
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(invalid);
    }

    Err(invalid())
}

/// Parse relative time like "now-7d"
fn parse_relative_time(s: &str, now: DateTime<Utc>) -> ApiResult<DateTime<Utc>> {
    if s == "now" {
        return Ok(now);
    }

    let re = regex::Regex::new(r"^now-(\d+)([mhdw])$")
        .map_err(|_| ApiError::Internal("Regex error".to_string()))?;

    let caps = re.captures(s).ok_or_else(|| {
        ApiError::Validation(format!("Cannot parse relative time: {}", s))
    })?;

    let amount: i64 = caps[1]
        .parse()
        .map_err(|_| ApiError::Validation("Invalid number in time expression".to_string()))?;

    let offset = match &caps[2] {
        "m" => chrono::Duration::try_minutes(amount),
        "h" => chrono::Duration::try_hours(amount),
        "d" => chrono::Duration::try_days(amount),
        "w" => chrono::Duration::try_weeks(amount),
        unit => {
            return Err(ApiError::Validation(format!("Invalid time unit: {}", unit)));
        }
    };

    offset
        .and_then(|offset| now.checked_sub_signed(offset))
        .ok_or_else(|| ApiError::Validation(format!("Relative time out of range: {}", s)))
}
