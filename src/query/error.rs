//! Query error types
//!
//! Defines all error conditions that can occur while planning and running a
//! query. Errors raised inside a chunk are wrapped with that chunk's range so
//! the caller can tell which slice of time failed.

use thiserror::Error;

use crate::client::ClientError;
use crate::frame::TimeRange;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Query payload could not be understood
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Invalid time range specified
    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    /// Backend, transport or decode failure
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Failure inside one chunk of a split query
    #[error("[chunk {range}] {source}")]
    Chunk {
        range: TimeRange,
        source: Box<QueryError>,
    },

    /// A chunk task panicked
    #[error("panic: {0}")]
    Panic(String),

    /// The caller gave up before the query finished
    #[error("Query cancelled")]
    Cancelled,
}

impl QueryError {
    /// Attribute an error to the chunk covering `range`
    pub fn in_chunk(range: TimeRange, source: QueryError) -> Self {
        QueryError::Chunk {
            range,
            source: Box::new(source),
        }
    }

    /// Whether this error, or the chunk error it wraps, is a cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            QueryError::Cancelled | QueryError::Client(ClientError::Cancelled) => true,
            QueryError::Chunk { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
