//! Frame error types
//!
//! Invariant violations detected while reshaping frames.

use thiserror::Error;

use super::types::ColumnType;

/// Errors that can occur when combining or reshaping frames
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    /// Columns of one frame disagree on their length
    #[error("Column {column} has {found} rows, expected {expected}")]
    RowCountMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    /// Two columns that must line up hold different types
    #[error("Column type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: ColumnType,
        found: ColumnType,
    },

    /// Operation needs a timestamp column
    #[error("Frame has no time column")]
    MissingTimeColumn,

    /// Time column holds a null where a value is required
    #[error("Null timestamp at row {row}")]
    NullTimestamp { row: usize },

    /// Time column is not ascending
    #[error("Time column is not sorted ascending at row {row}")]
    Unsorted { row: usize },

    /// Frame is not a long-format time series
    #[error("Frame is not a long time series: {0}")]
    NotLongFormat(String),
}

/// Result type alias for frame operations
pub type FrameResult<T> = Result<T, FrameError>;
