//! Decode error types
//!
//! Every variant carries enough context (field name, expected vs. observed
//! shape) to diagnose a bad response without a backend-side trace.

use thiserror::Error;

/// Errors that can occur while turning a backend response into a frame
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Arrow IPC stream could not be read
    #[error("Error reading Arrow stream: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Body ended in the middle of an Arrow message
    #[error("Arrow stream ended unexpectedly: {0}")]
    TruncatedStream(String),

    /// A later record batch disagrees with the schema of the first one
    #[error("Record batch {batch} has {found} columns, schema has {expected}")]
    BatchWidth {
        batch: usize,
        expected: usize,
        found: usize,
    },

    /// An Arrow array does not hold the type its field declared
    #[error("Field {field}: expected {expected} array, found {found}")]
    ArrayType {
        field: String,
        expected: String,
        found: String,
    },

    /// JSON body is not valid JSON
    #[error("Failed to decode JSON response: {0}")]
    Json(#[from] serde_json::Error),

    /// Required top-level field absent
    #[error("Missing '{0}' field in response")]
    MissingField(&'static str),

    /// A JSON value has the wrong shape
    #[error("Invalid {field}: expected {expected}, found {found}")]
    InvalidShape {
        field: String,
        expected: String,
        found: String,
    },
}

/// Result type alias for decode operations
pub type DecodeResult<T> = Result<T, DecodeError>;
