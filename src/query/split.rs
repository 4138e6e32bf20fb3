//! Range Splitter
//!
//! Cuts a time range into contiguous chunks whose internal boundaries are
//! multiples of the chunk size counted from the Unix epoch:
//!
//! ```text
//! 6h chunks over 14:30 → 02:30 (next day):
//!   [14:30, 18:00) [18:00, 00:00) [00:00, 02:30)
//! ```
//!
//! Aligned boundaries mean a `GROUP BY` bucket of the same (or a dividing)
//! size never straddles two chunks.

use chrono::{Duration, TimeZone, Utc};

use super::model::SplitSetting;
use crate::frame::TimeRange;

/// Ordered chunks covering a range exactly
pub type ChunkPlan = Vec<TimeRange>;

/// Chunk size picked from the length of the range, `None` below 3 hours
pub fn auto_chunk_size(range: &TimeRange) -> Option<Duration> {
    let span = range.duration();
    if span < Duration::hours(3) {
        None
    } else if span < Duration::hours(24) {
        Some(Duration::hours(1))
    } else if span < Duration::days(7) {
        Some(Duration::hours(6))
    } else if span < Duration::days(30) {
        Some(Duration::days(1))
    } else {
        Some(Duration::days(7))
    }
}

/// Chunk size for `setting` over `range`, `None` when splitting is off
pub fn chunk_size(range: &TimeRange, setting: SplitSetting) -> Option<Duration> {
    match setting {
        SplitSetting::Auto => auto_chunk_size(range),
        SplitSetting::Off => None,
        SplitSetting::Fixed(size) => Some(size),
    }
}

/// Chunk size for a setting string such as `auto`, `off` or `6h`
pub fn split_duration(range: &TimeRange, setting: &str) -> Option<Duration> {
    chunk_size(range, SplitSetting::parse(setting))
}

/// Split `range` into epoch-aligned chunks of `size`.
///
/// Returns the whole range as one chunk when `size` is not positive or the
/// range ends at or before the first aligned boundary.
pub fn split_time_range(range: &TimeRange, size: Duration) -> ChunkPlan {
    let size_ms = size.num_milliseconds();
    if size_ms <= 0 {
        return vec![*range];
    }

    let from_ms = range.from.timestamp_millis();
    let to_ms = range.to.timestamp_millis();
    let first_boundary = (from_ms.div_euclid(size_ms) + 1) * size_ms;
    if first_boundary >= to_ms {
        return vec![*range];
    }

    let instant = |ms: i64| Utc.timestamp_millis_opt(ms).single();

    let mut chunks = Vec::new();
    let mut start = range.from;
    let mut boundary = first_boundary;
    while boundary < to_ms {
        let Some(end) = instant(boundary) else {
            break;
        };
        chunks.push(TimeRange { from: start, to: end });
        start = end;
        boundary += size_ms;
    }
    chunks.push(TimeRange {
        from: start,
        to: range.to,
    });

    chunks
}
