//! Split Eligibility
//!
//! Conservative textual checks deciding whether a query may be split.
//! Keywords inside string literals or comments also count, which can
//! disable splitting needlessly but never enables it wrongly.

use regex::Regex;
use std::sync::OnceLock;

/// Reason a query must run as a single statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitBlocker {
    /// A per-chunk LIMIT would multiply the row count
    Limit,
    /// Each chunk would aggregate independently
    AggregationWithoutTimeGroup,
    /// Splitting would re-run the same unfiltered query per chunk
    NoTimeFilter,
    /// Macro rewriting of multi-statement SQL is unsafe
    Union,
}

impl std::fmt::Display for SplitBlocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            SplitBlocker::Limit => "query has a LIMIT clause",
            SplitBlocker::AggregationWithoutTimeGroup => "aggregation without $__timeGroup",
            SplitBlocker::NoTimeFilter => "query does not use a time filter macro",
            SplitBlocker::Union => "query contains UNION",
        };
        f.write_str(reason)
    }
}

/// Standard SQL and DuckDB aggregate functions
const AGGREGATE_FUNCTIONS: &[&str] = &[
    // General
    "SUM(", "FSUM(", "COUNT(", "COUNTIF(", "AVG(", "FAVG(",
    "MIN(", "MAX(", "ANY_VALUE(",
    "ARG_MIN(", "ARG_MIN_NULL(", "ARG_MAX(", "ARG_MAX_NULL(",
    "FIRST(", "LAST(", "PRODUCT(",
    "STRING_AGG(", "LIST(", "ARRAY_AGG(",
    "BOOL_AND(", "BOOL_OR(",
    "BIT_AND(", "BIT_OR(", "BIT_XOR(", "BITSTRING_AGG(",
    "GEOMETRIC_MEAN(", "WEIGHTED_AVG(",
    // Statistical
    "MEDIAN(", "MODE(", "MAD(",
    "STDDEV(", "STDDEV_POP(", "STDDEV_SAMP(",
    "VARIANCE(", "VAR_POP(", "VAR_SAMP(",
    "SKEWNESS(", "SKEWNESS_POP(",
    "KURTOSIS(", "KURTOSIS_POP(",
    "ENTROPY(", "CORR(",
    "COVAR_POP(", "COVAR_SAMP(",
    "QUANTILE(", "QUANTILE_CONT(", "QUANTILE_DISC(",
    "HISTOGRAM(", "HISTOGRAM_EXACT(", "HISTOGRAM_VALUES(",
    // Approximate
    "APPROX_COUNT_DISTINCT(", "APPROX_QUANTILE(", "APPROX_TOP_K(",
    "RESERVOIR_QUANTILE(",
    // Regression
    "REGR_AVGX(", "REGR_AVGY(", "REGR_COUNT(",
    "REGR_INTERCEPT(", "REGR_R2(", "REGR_SLOPE(",
    "REGR_SXX(", "REGR_SXY(", "REGR_SYY(",
];

static LIMIT_KEYWORD: OnceLock<Option<Regex>> = OnceLock::new();
static UNION_KEYWORD: OnceLock<Option<Regex>> = OnceLock::new();

/// Case-insensitive whole-word match. A pattern that fails to compile
/// matches everything, which only ever disables splitting.
fn contains_keyword(cell: &'static OnceLock<Option<Regex>>, keyword: &str, sql: &str) -> bool {
    let pattern = cell.get_or_init(|| {
        Regex::new(&format!(r"(?i)\b{}\b", keyword))
            .map_err(|e| tracing::error!(keyword, error = %e, "Invalid keyword pattern"))
            .ok()
    });
    pattern.as_ref().map_or(true, |re| re.is_match(sql))
}

/// Whether `sql` has a standalone LIMIT keyword
pub fn contains_limit(sql: &str) -> bool {
    contains_keyword(&LIMIT_KEYWORD, "LIMIT", sql)
}

/// Whether `sql` has a standalone UNION keyword
pub fn contains_union(sql: &str) -> bool {
    contains_keyword(&UNION_KEYWORD, "UNION", sql)
}

/// Whether `sql` aggregates over the whole range rather than per time bucket
pub fn contains_aggregation_without_time_group(sql: &str) -> bool {
    if sql.contains("$__timeGroup") {
        return false;
    }

    let upper = sql.to_uppercase();
    if upper.contains("GROUP BY") {
        return true;
    }
    // Covers SELECT DISTINCT and *_DISTINCT( functions
    if upper.contains("DISTINCT ") || upper.contains("DISTINCT(") || upper.ends_with("DISTINCT") {
        return true;
    }
    if AGGREGATE_FUNCTIONS.iter().any(|f| upper.contains(f)) {
        return true;
    }
    // Window functions restart in every chunk
    upper.contains(" OVER(") || upper.contains(" OVER (")
}

/// Whether `sql` references the query's time bounds at all
pub fn uses_time_macros(sql: &str) -> bool {
    sql.contains("$__timeFilter") || sql.contains("$__timeFrom") || sql.contains("$__timeTo")
}

/// Every reason `sql` cannot be split, in check order
pub fn split_blockers(sql: &str) -> Vec<SplitBlocker> {
    let mut blockers = Vec::new();
    if contains_limit(sql) {
        blockers.push(SplitBlocker::Limit);
    }
    if contains_aggregation_without_time_group(sql) {
        blockers.push(SplitBlocker::AggregationWithoutTimeGroup);
    }
    if !uses_time_macros(sql) {
        blockers.push(SplitBlocker::NoTimeFilter);
    }
    if contains_union(sql) {
        blockers.push(SplitBlocker::Union);
    }
    blockers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_limit() {
        assert!(contains_limit("SELECT * FROM t LIMIT 10"));
        assert!(contains_limit("select * from t\nlimit 10"));
        assert!(contains_limit("SELECT * FROM t LIMIT"));
        assert!(!contains_limit("SELECT limited FROM t"));
        assert!(!contains_limit("SELECT * FROM rate_limits"));
    }

    #[test]
    fn test_aggregation_detection() {
        assert!(contains_aggregation_without_time_group(
            "SELECT host, count(*) FROM t WHERE $__timeFilter(time) GROUP BY host"
        ));
        assert!(contains_aggregation_without_time_group("SELECT DISTINCT host FROM t"));
        assert!(contains_aggregation_without_time_group(
            "SELECT approx_count_distinct(host) FROM t"
        ));
        assert!(contains_aggregation_without_time_group("SELECT avg(v) FROM t"));
        assert!(contains_aggregation_without_time_group(
            "SELECT v - lag(v) OVER (ORDER BY time) FROM t"
        ));
        assert!(!contains_aggregation_without_time_group(
            "SELECT $__timeGroup(time, '1h'), avg(v) FROM t GROUP BY 1"
        ));
        assert!(!contains_aggregation_without_time_group(
            "SELECT time, host, v FROM t WHERE $__timeFilter(time)"
        ));
    }

    #[test]
    fn test_time_macros() {
        assert!(uses_time_macros("WHERE $__timeFilter(time)"));
        assert!(uses_time_macros("WHERE time > $__timeFrom()"));
        assert!(uses_time_macros("WHERE time < $__timeTo()"));
        assert!(!uses_time_macros("SELECT * FROM t"));
    }

    #[test]
    fn test_split_blockers() {
        assert!(split_blockers("SELECT time, v FROM t WHERE $__timeFilter(time)").is_empty());

        assert_eq!(
            split_blockers("SELECT count(*) FROM t LIMIT 5"),
            vec![
                SplitBlocker::Limit,
                SplitBlocker::AggregationWithoutTimeGroup,
                SplitBlocker::NoTimeFilter
            ]
        );

        assert_eq!(
            split_blockers(
                "SELECT time, v FROM a WHERE $__timeFilter(time) UNION ALL \
                 SELECT time, v FROM b WHERE $__timeFilter(time)"
            ),
            vec![SplitBlocker::Union]
        );
    }

    #[test]
    fn test_blocker_display() {
        assert_eq!(SplitBlocker::Limit.to_string(), "query has a LIMIT clause");
    }
}
