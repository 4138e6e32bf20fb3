//! # Chronoquery
//!
//! Time-range splitting query adapter for a remote SQL time-series engine.
//! A long-range query is cut into epoch-aligned chunks, the chunks run
//! concurrently against the backend, and the columnar results are merged
//! back into one chart-ready frame.
//!
//! ## Modules
//!
//! - [`frame`]: result frames, merge, time sort and long-to-wide pivot
//! - [`decode`]: Arrow IPC and JSON response decoding
//! - [`client`]: backend settings, the `QueryBackend` seam and its HTTP client
//! - [`query`]: macros, splitting, eligibility, scheduling and execution
//! - [`api`]: REST API server with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::{Duration, Utc};
//! use chronoquery::client::{BackendClient, BackendSettings};
//! use chronoquery::frame::TimeRange;
//! use chronoquery::query::{QueryExecutor, QuerySpec};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let executor = QueryExecutor::new(Arc::new(BackendClient::new()?));
//!     let settings = BackendSettings::new("http://localhost:8000", "token");
//!
//!     let spec = QuerySpec::new(
//!         "A",
//!         "SELECT $__timeGroup(time, $__interval) AS time, avg(usage) AS usage \
//!          FROM cpu WHERE $__timeFilter(time) GROUP BY 1",
//!     );
//!     let to = Utc::now();
//!     let range = TimeRange::try_new(to - Duration::days(7), to).ok_or("invalid range")?;
//!     let frames = executor
//!         .execute(&settings, &spec, range, &CancellationToken::new())
//!         .await?;
//!
//!     println!("{} rows", frames.first().map_or(0, |f| f.rows()));
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod decode;
pub mod frame;
pub mod logging;
pub mod query;

// Re-export top-level types for convenience
pub use frame::{Column, ColumnData, Frame, FrameFormat, TimeRange};

pub use client::{BackendClient, BackendSettings, ClientError, QueryBackend};

pub use query::{QueryError, QueryExecutor, QueryFormat, QuerySpec};

pub use api::{build_router, serve, ApiConfig, ApiError, AppState};

pub use config::{BackendConfig, Config, ConfigError, LoggingConfig};
