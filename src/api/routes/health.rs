//! Health Routes
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health - Backend check through the configured datasource

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;
use crate::query::HealthStatus;

/// GET /health/live
///
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health
///
/// Runs the backend health query. Responds 503 when the backend cannot be
/// reached or rejects the settings.
pub async fn backend_health(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let check = state.executor.check_health(&state.settings, &cancel).await;
    let code = match check.status {
        HealthStatus::Ok => StatusCode::OK,
        HealthStatus::Error => StatusCode::SERVICE_UNAVAILABLE,
    };

    let body = HealthResponse {
        status: check.status,
        message: check.message,
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    (code, Json(body))
}
