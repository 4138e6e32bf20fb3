//! Chronoquery REST API
//!
//! HTTP surface the host talks to, built with Axum.
//!
//! # Endpoints
//!
//! ## Query
//! - `POST /api/v1/query` - Run a batch of queries, results keyed by ref id
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health` - Backend check (`SHOW DATABASES`)
//!
//! # Example
//!
//! ```rust,ignore
//! use chronoquery::api::{serve, ApiConfig, AppState};
//! use chronoquery::client::{BackendClient, BackendSettings};
//! use chronoquery::query::QueryExecutor;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(BackendClient::new()?);
//!     let executor = Arc::new(QueryExecutor::new(client));
//!     let settings = BackendSettings::new("http://localhost:8000", "token");
//!     let config = ApiConfig::default();
//!
//!     serve(AppState::new(executor, settings, config.clone()), &config).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{ApiConfig, AppState};

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_body_size;

    let api_routes = Router::new()
        .route("/query", post(routes::query::execute_query))
        .layer(DefaultBodyLimit::max(body_limit));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/", get(routes::health::backend_health));

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Start the API server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Chronoquery API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Chronoquery API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{BackendSettings, ClientError, ClientResult, QueryBackend};
    use crate::frame::{Column, ColumnData, Frame};
    use crate::query::QueryExecutor;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tokio_util::sync::CancellationToken;
    use tower::util::ServiceExt;

    /// Answers every statement with one row, or fails statements naming `broken`
    struct StubBackend;

    #[async_trait]
    impl QueryBackend for StubBackend {
        async fn execute(
            &self,
            _settings: &BackendSettings,
            sql: &str,
            _cancel: &CancellationToken,
        ) -> ClientResult<Frame> {
            if sql.contains("broken") {
                return Err(ClientError::Backend {
                    status: 400,
                    message: "Table not found: broken".to_string(),
                });
            }
            Ok(Frame::with_columns(
                "",
                vec![
                    Column::from_data("time", ColumnData::Timestamp(vec![Some(1_771_408_800_000)])),
                    Column::from_data("value", ColumnData::Float64(vec![Some(0.5)])),
                ],
            ))
        }
    }

    struct DownBackend;

    #[async_trait]
    impl QueryBackend for DownBackend {
        async fn execute(
            &self,
            _settings: &BackendSettings,
            _sql: &str,
            _cancel: &CancellationToken,
        ) -> ClientResult<Frame> {
            Err(ClientError::EmptyBackendError { status: 502 })
        }
    }

    fn create_test_app(backend: Arc<dyn QueryBackend>) -> Router {
        let executor = Arc::new(QueryExecutor::new(backend));
        let settings = BackendSettings::new("http://localhost:8000", "key");
        build_router(AppState::new(executor, settings, ApiConfig::default()))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_query(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/query")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_live() {
        let app = create_test_app(Arc::new(StubBackend));

        let response = app
            .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_backend_health() {
        let app = create_test_app(Arc::new(StubBackend));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["message"], "Backend datasource is working");

        let app = create_test_app(Arc::new(DownBackend));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(
            body["message"],
            "Failed to connect to backend: Backend returned HTTP 502 with no error message"
        );
    }

    #[tokio::test]
    async fn test_query_batch() {
        let app = create_test_app(Arc::new(StubBackend));

        let response = app
            .oneshot(post_query(
                r#"{
                    "range": {"from": "2026-02-18T09:00:00Z", "to": "2026-02-18T10:00:00Z"},
                    "queries": [
                        {"refId": "A", "sql": "SELECT time, value FROM cpu WHERE $__timeFilter(time)"},
                        {"refId": "B", "sql": "SELECT * FROM broken", "format": "table"}
                    ]
                }"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;

        let a = &body["results"]["A"];
        assert!(a.get("error").is_none());
        assert_eq!(a["frames"][0]["ref_id"], "A");
        assert_eq!(a["frames"][0]["meta"]["format"], "time-series-wide");

        let b = &body["results"]["B"];
        assert_eq!(b["frames"].as_array().unwrap().len(), 0);
        assert_eq!(b["error"], "Backend error (HTTP 400): Table not found: broken");
    }

    #[tokio::test]
    async fn test_query_invalid_range() {
        let app = create_test_app(Arc::new(StubBackend));

        let response = app
            .oneshot(post_query(
                r#"{"range": {"from": "now", "to": "now-1h"}, "queries": [{"refId": "A", "sql": "SELECT 1"}]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_query_empty_batch() {
        let app = create_test_app(Arc::new(StubBackend));

        let response = app
            .oneshot(post_query(
                r#"{"range": {"from": "now-1h", "to": "now"}, "queries": []}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_query_invalid_json() {
        let app = create_test_app(Arc::new(StubBackend));

        let response = app.oneshot(post_query("not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
