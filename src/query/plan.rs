//! Query planning
//!
//! Decides, before anything is sent, how a query will run: which settings
//! apply, whether the range is split, and the SQL each statement carries.

use chrono::Duration;

use super::eligibility::{split_blockers, SplitBlocker};
use super::macros::{expand_macros, expand_macros_for_chunk};
use super::model::{QueryFormat, QuerySpec};
use super::split::{chunk_size, split_time_range, ChunkPlan};
use crate::client::BackendSettings;
use crate::frame::TimeRange;

/// Execution plan for one query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub ref_id: String,
    pub format: QueryFormat,
    /// SQL template with macros still in place
    pub sql: String,
    /// Settings after the per-query database override
    pub settings: BackendSettings,
    pub range: TimeRange,
    /// Chunk size the split setting asked for
    pub chunk_size: Option<Duration>,
    /// Reasons splitting was refused
    pub blockers: Vec<SplitBlocker>,
    pub chunks: ChunkPlan,
}

impl QueryPlan {
    /// Plan `spec` over `range` using `settings` as the defaults
    pub fn build(settings: &BackendSettings, spec: &QuerySpec, range: TimeRange) -> Self {
        let settings = match spec.database_override() {
            Some(database) => settings.with_database(database),
            None => settings.clone(),
        };

        let sql = spec.effective_sql();
        let chunk_size = chunk_size(&range, spec.split_setting(&settings.split_duration));
        let blockers = if chunk_size.is_some() {
            split_blockers(sql)
        } else {
            Vec::new()
        };
        for blocker in &blockers {
            tracing::debug!(ref_id = %spec.ref_id, reason = %blocker, "Skipping split");
        }

        let sql = match spec.format {
            QueryFormat::TimeSeries => optimize_time_series_query(sql),
            QueryFormat::Table => sql.to_string(),
        };

        let chunks = match chunk_size {
            Some(size) if blockers.is_empty() => split_time_range(&range, size),
            _ => vec![range],
        };

        Self {
            ref_id: spec.ref_id.clone(),
            format: spec.format,
            sql,
            settings,
            range,
            chunk_size,
            blockers,
            chunks,
        }
    }

    /// Whether the query runs through the chunk scheduler
    pub fn is_split(&self) -> bool {
        self.chunk_size.is_some() && self.blockers.is_empty()
    }

    /// Fully expanded SQL for each statement, paired with its range
    pub fn statements(&self) -> Vec<(TimeRange, String)> {
        if self.is_split() {
            self.chunks
                .iter()
                .map(|chunk| (*chunk, expand_macros_for_chunk(&self.sql, chunk, &self.range)))
                .collect()
        } else {
            vec![(self.range, expand_macros(&self.sql, &self.range))]
        }
    }
}

/// Append `ORDER BY time ASC` to a time-series query that has no ordering.
///
/// The clause goes before a trailing LIMIT or OFFSET. Queries that already
/// order, or never mention `time`, are returned unchanged.
pub fn optimize_time_series_query(sql: &str) -> String {
    let lower = sql.to_ascii_lowercase();
    if lower.contains("order by") || !lower.contains("time") {
        return sql.to_string();
    }

    let trimmed = sql.trim_end_matches([' ', '\t', '\n', '\r', ';']);
    let lower = trimmed.to_ascii_lowercase();

    let insert_at = match (lower.rfind(" limit "), lower.rfind(" offset ")) {
        (Some(limit), Some(offset)) => Some(limit.min(offset)),
        (Some(limit), None) => Some(limit),
        (None, Some(offset)) => Some(offset),
        (None, None) => None,
    };

    match insert_at {
        Some(at) => format!("{} ORDER BY time ASC{}", &trimmed[..at], &trimmed[at..]),
        None => format!("{} ORDER BY time ASC", trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn range(from: &str, to: &str) -> TimeRange {
        let parse = |s: &str| DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc);
        TimeRange::new(parse(from), parse(to))
    }

    fn settings() -> BackendSettings {
        BackendSettings::new("http://localhost:8000", "key")
    }

    #[test]
    fn test_optimize_appends_order() {
        assert_eq!(
            optimize_time_series_query("SELECT time, v FROM t;\n"),
            "SELECT time, v FROM t ORDER BY time ASC"
        );
    }

    #[test]
    fn test_optimize_before_limit_and_offset() {
        assert_eq!(
            optimize_time_series_query("SELECT time, v FROM t LIMIT 10 OFFSET 5"),
            "SELECT time, v FROM t ORDER BY time ASC LIMIT 10 OFFSET 5"
        );
        assert_eq!(
            optimize_time_series_query("SELECT time, v FROM t OFFSET 5"),
            "SELECT time, v FROM t ORDER BY time ASC OFFSET 5"
        );
    }

    #[test]
    fn test_optimize_leaves_ordered_or_timeless() {
        let ordered = "SELECT time, v FROM t ORDER BY v DESC";
        assert_eq!(optimize_time_series_query(ordered), ordered);
        let timeless = "SHOW TABLES";
        assert_eq!(optimize_time_series_query(timeless), timeless);
    }

    #[test]
    fn test_plan_short_range_single() {
        let spec = QuerySpec::new("A", "SELECT time, v FROM t WHERE $__timeFilter(time)");
        let plan = QueryPlan::build(
            &settings(),
            &spec,
            range("2026-02-18T10:00:00Z", "2026-02-18T11:00:00Z"),
        );
        assert!(!plan.is_split());
        assert_eq!(plan.chunks.len(), 1);
        assert_eq!(
            plan.statements()[0].1,
            "SELECT time, v FROM t WHERE time >= '2026-02-18T10:00:00Z' AND time < '2026-02-18T11:00:00Z' ORDER BY time ASC"
        );
    }

    #[test]
    fn test_plan_auto_split_uses_original_interval() {
        let spec = QuerySpec::new(
            "A",
            "SELECT $__timeGroup(time, $__interval) AS time, avg(v) FROM t WHERE $__timeFilter(time) GROUP BY 1",
        );
        let plan = QueryPlan::build(
            &settings(),
            &spec,
            range("2026-02-10T00:00:00Z", "2026-02-18T00:00:00Z"),
        );

        assert!(plan.is_split());
        assert_eq!(plan.chunk_size, Some(Duration::days(1)));
        assert_eq!(plan.chunks.len(), 8);
        for (_, sql) in plan.statements() {
            assert!(sql.contains("// 3600) * 3600"));
            assert!(!sql.contains("$__"));
        }
    }

    #[test]
    fn test_plan_blockers_disable_split() {
        let spec = QuerySpec::new("A", "SELECT time, v FROM t WHERE $__timeFilter(time) LIMIT 100");
        let plan = QueryPlan::build(
            &settings(),
            &spec,
            range("2026-02-10T00:00:00Z", "2026-02-18T00:00:00Z"),
        );
        assert!(!plan.is_split());
        assert_eq!(plan.blockers, vec![SplitBlocker::Limit]);
        assert_eq!(plan.chunks.len(), 1);
    }

    #[test]
    fn test_plan_database_override_is_a_copy() {
        let shared = settings();
        let spec = QuerySpec::new("A", "SELECT 1").database("logs");
        let plan = QueryPlan::build(
            &shared,
            &spec,
            range("2026-02-18T10:00:00Z", "2026-02-18T11:00:00Z"),
        );
        assert_eq!(plan.settings.database, "logs");
        assert_eq!(shared.database, "default");
    }

    #[test]
    fn test_plan_table_format_not_reordered() {
        let spec = QuerySpec::new("A", "SELECT time, v FROM t").format(QueryFormat::Table);
        let plan = QueryPlan::build(
            &settings(),
            &spec,
            range("2026-02-18T10:00:00Z", "2026-02-18T11:00:00Z"),
        );
        assert_eq!(plan.sql, "SELECT time, v FROM t");
    }
}
