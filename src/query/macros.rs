//! Macro Expander
//!
//! Textual substitution of time macros into backend SQL:
//!
//! ```text
//! $__timeFilter(col)        → col >= '<from>' AND col < '<to>'
//! $__timeFrom()             → '<from>'
//! $__timeTo()               → '<to>'
//! $__interval               → "1 hour" | "10 minutes" | "1 minute" | "10 seconds"
//! $__timeGroup(col, '1h')   → to_timestamp((epoch_ns(col) // 1000000000 // 3600) * 3600)
//! ```
//!
//! Bounds come from the chunk being run. `$__interval` is sized from the
//! original range so every chunk buckets at the same granularity.
//!
//! `$__timeGroup` uses integer epoch division: floating-point epoch math
//! rounds instants just before a boundary (05:59:59.999) into the next bucket.

use chrono::Duration;

use crate::frame::TimeRange;

const TIME_FILTER: &str = "$__timeFilter(";
const TIME_FROM: &str = "$__timeFrom()";
const TIME_TO: &str = "$__timeTo()";
const INTERVAL: &str = "$__interval";
const TIME_GROUP: &str = "$__timeGroup(";

/// Column used when `$__timeFilter()` has no argument
pub const DEFAULT_TIME_COLUMN: &str = "time";

/// Bucket size used for unrecognised `$__timeGroup` intervals
pub const DEFAULT_INTERVAL_SECS: i64 = 3600;

/// Expand every macro against a single range
pub fn expand_macros(sql: &str, range: &TimeRange) -> String {
    expand_macros_for_chunk(sql, range, range)
}

/// Expand every macro for one chunk of a split query
pub fn expand_macros_for_chunk(sql: &str, chunk: &TimeRange, original: &TimeRange) -> String {
    let sql = expand_time_filter(sql, chunk);
    let sql = sql
        .replace(TIME_FROM, &format!("'{}'", chunk.from_literal()))
        .replace(TIME_TO, &format!("'{}'", chunk.to_literal()))
        .replace(INTERVAL, interval_for(original.duration()));
    expand_time_group(&sql)
}

/// Coarse interval text for a range of the given length
pub fn interval_for(span: Duration) -> &'static str {
    if span > Duration::days(7) {
        "1 hour"
    } else if span > Duration::days(1) {
        "10 minutes"
    } else if span > Duration::hours(6) {
        "1 minute"
    } else {
        "10 seconds"
    }
}

/// Seconds in an interval written as `1h` or `1 hour`
pub fn interval_seconds(interval: &str) -> i64 {
    match interval.trim() {
        "1s" | "1 second" => 1,
        "5s" | "5 seconds" => 5,
        "10s" | "10 seconds" => 10,
        "30s" | "30 seconds" => 30,
        "1m" | "1 minute" => 60,
        "5m" | "5 minutes" => 300,
        "10m" | "10 minutes" => 600,
        "15m" | "15 minutes" => 900,
        "30m" | "30 minutes" => 1800,
        "1h" | "1 hour" => 3600,
        "6h" | "6 hours" => 21600,
        "12h" | "12 hours" => 43200,
        "1d" | "1 day" => 86400,
        _ => DEFAULT_INTERVAL_SECS,
    }
}

/// Byte offset of the `)` closing an argument list that starts at `args[0]`
fn closing_paren(args: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in args.char_indices() {
        match c {
            '(' => depth += 1,
            ')' if depth == 0 => return Some(i),
            ')' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Byte offset of the first comma outside nested parentheses
fn top_level_comma(args: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in args.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Replace each `prefix(...)` call with `expand(args)`.
///
/// `expand` returning `None` leaves that call as written. An unterminated
/// call stops the scan and keeps the rest of the text verbatim.
fn expand_calls(sql: &str, prefix: &str, mut expand: impl FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(sql.len() + 64);
    let mut rest = sql;

    while let Some(start) = rest.find(prefix) {
        let args_start = start + prefix.len();
        let Some(close) = closing_paren(&rest[args_start..]) else {
            tracing::warn!(
                macro_name = prefix.trim_end_matches('('),
                "Macro has no closing parenthesis, leaving it unexpanded"
            );
            break;
        };
        let args_end = args_start + close;
        let call_end = args_end + 1;

        match expand(&rest[args_start..args_end]) {
            Some(replacement) => {
                out.push_str(&rest[..start]);
                out.push_str(&replacement);
            }
            None => out.push_str(&rest[..call_end]),
        }
        rest = &rest[call_end..];
    }

    out.push_str(rest);
    out
}

fn expand_time_filter(sql: &str, range: &TimeRange) -> String {
    let from = range.from_literal();
    let to = range.to_literal();

    expand_calls(sql, TIME_FILTER, |args| {
        let mut column = args.trim();
        if column.is_empty() {
            tracing::warn!("$__timeFilter has no column argument, using '{}'", DEFAULT_TIME_COLUMN);
            column = DEFAULT_TIME_COLUMN;
        }
        Some(format!("{column} >= '{from}' AND {column} < '{to}'"))
    })
}

fn expand_time_group(sql: &str) -> String {
    expand_calls(sql, TIME_GROUP, |args| {
        let Some(comma) = top_level_comma(args) else {
            tracing::warn!(
                found = %args,
                "$__timeGroup requires two arguments: $__timeGroup(column, interval)"
            );
            return None;
        };

        let column = args[..comma].trim();
        let interval = args[comma + 1..].trim().trim_matches(|c| c == '\'' || c == '"');
        if column.is_empty() {
            tracing::warn!(found = %args, "$__timeGroup has no column argument");
            return None;
        }

        let secs = interval_seconds(interval);
        Some(format!(
            "to_timestamp((epoch_ns({column}) // 1000000000 // {secs}) * {secs})"
        ))
    })
}
