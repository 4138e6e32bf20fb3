//! Frame Merger
//!
//! Concatenates per-chunk frames into one frame, in chunk order.
//!
//! Chunks are contiguous and non-overlapping in time, so appending their rows
//! in plan order yields time-ordered output as long as each chunk is itself
//! ordered. Frames that do not match the base schema are dropped rather than
//! failing the whole merge.

use super::types::Frame;

/// Merge chunk frames into a single frame.
///
/// - No frames: `None`
/// - One frame: returned as-is
/// - Otherwise the first frame with columns becomes the base, and every later
///   frame with the same column count and types is appended to it.
pub fn merge_frames(frames: Vec<Frame>) -> Option<Frame> {
    if frames.len() <= 1 {
        return frames.into_iter().next();
    }

    let base_index = match frames.iter().position(|f| !f.columns.is_empty()) {
        Some(i) => i,
        None => return frames.into_iter().next(),
    };

    let mut remaining = frames.into_iter().skip(base_index);
    let mut merged = remaining.next()?;
    let schema = merged.schema();

    let compatible: Vec<Frame> = remaining
        .enumerate()
        .filter(|(offset, frame)| {
            let index = base_index + 1 + offset;
            if frame.columns.is_empty() {
                tracing::debug!(chunk = index, "Skipping empty chunk frame");
                return false;
            }
            if frame.columns.len() != schema.len() {
                tracing::warn!(
                    chunk = index,
                    expected_columns = schema.len(),
                    found_columns = frame.columns.len(),
                    "Skipping chunk frame with mismatched column count"
                );
                return false;
            }
            if frame.schema() != schema {
                tracing::warn!(chunk = index, "Skipping chunk frame with mismatched column types");
                return false;
            }
            if let Err(e) = frame.row_len() {
                tracing::warn!(chunk = index, error = %e, "Skipping malformed chunk frame");
                return false;
            }
            true
        })
        .map(|(_, frame)| frame)
        .collect();

    let additional: usize = compatible.iter().map(Frame::rows).sum();
    if additional == 0 {
        return Some(merged);
    }

    // Grow every column once to its final size before copying
    for column in &mut merged.columns {
        column.data.reserve(additional);
    }

    for frame in compatible {
        for (dst, src) in merged.columns.iter_mut().zip(frame.columns) {
            if let Err(e) = dst.data.append(src.data) {
                // Schema was checked above
                tracing::error!(column = %dst.name, error = %e, "Column append failed during merge");
            }
        }
    }

    Some(merged)
}
