//! Query Executor
//!
//! Runs planned queries against a [`QueryBackend`]:
//! 1. Plan (settings override, split decision, ORDER BY optimisation)
//! 2. Execute once, or fan out one statement per chunk
//! 3. Merge chunk frames in plan order
//! 4. Prepare the frame for the host (sort, pivot, tags)
//!
//! # Execution Pipeline
//!
//! ```text
//! QuerySpec → Plan ─┬─ single: expand → backend ─────────────────┬→ prepare → Frame
//!                   └─ split:  expand per chunk → scheduler → merge ┘
//! ```

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::{QueryError, QueryResult};
use super::macros::{expand_macros, expand_macros_for_chunk};
use super::model::{QueryFormat, QuerySpec};
use super::plan::QueryPlan;
use super::scheduler::execute_chunks;
use crate::client::{BackendSettings, QueryBackend};
use crate::frame::{
    ensure_ascending, long_to_wide, merge_frames, Frame, FrameFormat, TimeRange, TimeSeriesKind,
    TimeSeriesSchema, Visualization,
};

/// Statement used to check the backend is reachable
pub const HEALTH_CHECK_SQL: &str = "SHOW DATABASES";

/// One query of a batch
#[derive(Debug, Clone)]
pub struct DataQuery {
    pub spec: QuerySpec,
    pub range: TimeRange,
}

/// Outcome of one query of a batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct DataResponse {
    pub frames: Vec<Frame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Backend health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Error,
}

/// Result of a health check
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub message: String,
}

fn elapsed_ms(start: Instant) -> serde_json::Value {
    serde_json::Value::from(start.elapsed().as_millis() as u64)
}

/// Query executor
pub struct QueryExecutor {
    backend: Arc<dyn QueryBackend>,
}

impl QueryExecutor {
    /// Create a new query executor
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self { backend }
    }

    /// Run a batch of queries, keyed by ref id.
    ///
    /// A failing query reports its error in its own entry and does not affect
    /// the others.
    pub async fn query_data(
        &self,
        settings: &BackendSettings,
        queries: Vec<DataQuery>,
        cancel: &CancellationToken,
    ) -> BTreeMap<String, DataResponse> {
        let mut responses = BTreeMap::new();

        for query in queries {
            let ref_id = query.spec.ref_id.clone();
            let response = match self.execute(settings, &query.spec, query.range, cancel).await {
                Ok(frames) => DataResponse {
                    frames,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(ref_id = %ref_id, error = %e, "Query failed");
                    DataResponse {
                        frames: Vec::new(),
                        error: Some(e.to_string()),
                    }
                }
            };
            responses.insert(ref_id, response);
        }

        responses
    }

    /// Run one query and return its prepared frames.
    ///
    /// A query that produces no data returns an empty list.
    pub async fn execute(
        &self,
        settings: &BackendSettings,
        spec: &QuerySpec,
        range: TimeRange,
        cancel: &CancellationToken,
    ) -> QueryResult<Vec<Frame>> {
        let plan = QueryPlan::build(settings, spec, range);

        let frame = if plan.is_split() {
            self.execute_split(&plan, cancel).await?
        } else {
            self.execute_single(&plan, cancel).await?
        };

        if frame.is_empty() {
            tracing::warn!(ref_id = %plan.ref_id, "No data returned from query");
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let mut frame = prepare_frame(frame, &plan.ref_id, plan.format);
        frame
            .meta
            .custom
            .insert("prepare_time_ms".to_string(), elapsed_ms(start));

        tracing::debug!(
            ref_id = %plan.ref_id,
            rows = frame.rows(),
            fields = frame.columns.len(),
            format = ?frame.meta.format,
            "Returning query response"
        );
        Ok(vec![frame])
    }

    async fn execute_single(&self, plan: &QueryPlan, cancel: &CancellationToken) -> QueryResult<Frame> {
        let sql = expand_macros(&plan.sql, &plan.range);
        tracing::debug!(
            ref_id = %plan.ref_id,
            sql = %sql,
            format = ?plan.format,
            use_arrow = plan.settings.use_arrow,
            "Executing query"
        );

        let start = Instant::now();
        let mut frame = self.backend.execute(&plan.settings, &sql, cancel).await?;
        frame.meta.executed_query = Some(sql);
        frame
            .meta
            .custom
            .insert("execution_time_ms".to_string(), elapsed_ms(start));
        Ok(frame)
    }

    async fn execute_split(&self, plan: &QueryPlan, cancel: &CancellationToken) -> QueryResult<Frame> {
        tracing::info!(
            ref_id = %plan.ref_id,
            chunks = plan.chunks.len(),
            from = %plan.range.from,
            to = %plan.range.to,
            "Splitting query into chunks"
        );

        let backend = Arc::clone(&self.backend);
        let settings = Arc::new(plan.settings.clone());
        let template: Arc<str> = Arc::from(plan.sql.as_str());
        let original = plan.range;

        let start = Instant::now();
        let frames = execute_chunks(
            &plan.chunks,
            plan.settings.max_concurrency,
            cancel,
            |chunk| {
                let backend = Arc::clone(&backend);
                let settings = Arc::clone(&settings);
                let template = Arc::clone(&template);
                let cancel = cancel.clone();
                async move {
                    let sql = expand_macros_for_chunk(&template, &chunk, &original);
                    tracing::debug!(chunk = %chunk, sql = %sql, "Executing chunk");
                    Ok::<_, QueryError>(backend.execute(&settings, &sql, &cancel).await?)
                }
            },
        )
        .await?;

        let Some(mut merged) = merge_frames(frames) else {
            return Ok(Frame::default());
        };

        merged.meta.executed_query = Some(plan.sql.clone());
        let custom = &mut merged.meta.custom;
        custom.insert("split_chunks".to_string(), plan.chunks.len().into());
        custom.insert("execution_time_ms".to_string(), elapsed_ms(start));

        tracing::info!(
            ref_id = %plan.ref_id,
            chunks = plan.chunks.len(),
            rows = merged.rows(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Split query completed"
        );
        Ok(merged)
    }

    /// Run a trivial statement to check the backend is reachable
    pub async fn check_health(&self, settings: &BackendSettings, cancel: &CancellationToken) -> HealthCheck {
        match self.backend.execute(settings, HEALTH_CHECK_SQL, cancel).await {
            Ok(_) => {
                tracing::info!(url = %settings.url, database = %settings.database, "Health check passed");
                HealthCheck {
                    status: HealthStatus::Ok,
                    message: "Backend datasource is working".to_string(),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Health check failed");
                HealthCheck {
                    status: HealthStatus::Error,
                    message: format!("Failed to connect to backend: {}", e),
                }
            }
        }
    }
}

/// Name, tag, sort and pivot a result frame for the host.
///
/// Table queries are only tagged. Time series in long form are sorted by
/// time and pivoted to wide form; if the pivot fails the sorted long frame
/// is returned instead.
pub fn prepare_frame(mut frame: Frame, ref_id: &str, format: QueryFormat) -> Frame {
    frame.name = ref_id.to_string();
    frame.ref_id = ref_id.to_string();

    if format == QueryFormat::Table {
        frame.meta.format = FrameFormat::Table;
        frame.meta.preferred_visualization = Some(Visualization::Table);
        return frame;
    }
    frame.meta.preferred_visualization = Some(Visualization::Graph);

    let schema = TimeSeriesSchema::detect(&frame);
    match (schema.kind, schema.time_index) {
        (TimeSeriesKind::Wide, _) => {
            tracing::debug!(rows = frame.rows(), fields = frame.columns.len(), "Detected wide time series");
            frame.meta.format = FrameFormat::TimeSeriesWide;
            frame
        }
        (TimeSeriesKind::Long, Some(time_index)) => {
            frame.meta.format = FrameFormat::TimeSeriesLong;
            let long = ensure_ascending(frame, time_index);

            match long_to_wide(&long) {
                Ok(wide) => {
                    tracing::debug!(
                        input_rows = long.rows(),
                        wide_rows = wide.rows(),
                        wide_fields = wide.columns.len(),
                        "Converted long time series to wide"
                    );
                    wide
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Long to wide conversion failed, returning long format");
                    long
                }
            }
        }
        _ => {
            frame.meta.format = FrameFormat::Unknown;
            frame
        }
    }
}
