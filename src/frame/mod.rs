//! Tabular Result Frames
//!
//! The in-memory shape of every query result:
//!
//! - **Types**: `Frame`, `Column`, `ColumnData`, `TimeRange`
//! - **Merge**: concatenate chunk frames in plan order
//! - **Time series**: schema detection, time sort, long-to-wide pivot
//!
//! # Lifecycle
//!
//! ```text
//! decode (append per batch) → merge (chunk order) → sort → pivot → caller
//! ```
//!
//! A frame owns its columns outright. Merging moves the rows of every input
//! into the base frame; sorting and pivoting build new frames.

mod error;
mod merge;
mod timeseries;
mod types;

pub use error::{FrameError, FrameResult};
pub use merge::merge_frames;
pub use timeseries::{ensure_ascending, long_to_wide, TimeSeriesKind, TimeSeriesSchema};
pub use types::{
    Column, ColumnData, ColumnType, Frame, FrameFormat, FrameMeta, TimeRange, Value,
    Visualization,
};
