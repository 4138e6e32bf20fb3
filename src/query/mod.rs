//! Query Engine
//!
//! Turns a host query into one or more backend statements and a single
//! prepared frame:
//!
//! - **Model**: `QuerySpec`, result format and split setting
//! - **Macros**: `$__timeFilter`, `$__timeFrom`, `$__timeTo`, `$__interval`, `$__timeGroup`
//! - **Split**: epoch-aligned chunking of long ranges
//! - **Eligibility**: textual checks that keep unsafe queries whole
//! - **Scheduler**: bounded concurrent chunk execution
//! - **Plan / Executor**: the end-to-end pipeline
//!
//! # Example
//!
//! ```rust,ignore
//! use chrono::{Duration, Utc};
//! use chronoquery::query::{QueryExecutor, QuerySpec};
//!
//! let executor = QueryExecutor::new(Arc::new(BackendClient::new()?));
//! let spec = QuerySpec::new("A", "SELECT time, value FROM cpu WHERE $__timeFilter(time)");
//! let to = Utc::now();
//! let range = TimeRange::try_new(to - Duration::days(7), to).ok_or("invalid range")?;
//! let frames = executor
//!     .execute(&settings, &spec, range, &CancellationToken::new())
//!     .await?;
//! ```

mod eligibility;
mod error;
mod executor;
mod macros;
mod model;
mod plan;
mod scheduler;
mod split;

pub use eligibility::{
    contains_aggregation_without_time_group, contains_limit, contains_union, split_blockers,
    uses_time_macros, SplitBlocker,
};
pub use error::{QueryError, QueryResult};
pub use executor::{
    prepare_frame, DataQuery, DataResponse, HealthCheck, HealthStatus, QueryExecutor,
    HEALTH_CHECK_SQL,
};
pub use macros::{expand_macros, expand_macros_for_chunk, interval_for, interval_seconds};
pub use model::{QueryFormat, QuerySpec, SplitSetting};
pub use plan::{optimize_time_series_query, QueryPlan};
pub use scheduler::execute_chunks;
pub use split::{auto_chunk_size, chunk_size, split_duration, split_time_range, ChunkPlan};
