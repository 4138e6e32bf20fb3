//! Client error types
//!
//! Transport failures are mapped to actionable messages. The underlying
//! reqwest error stays attached as the source for logging.

use serde::Deserialize;
use std::error::Error as _;
use thiserror::Error;

use crate::decode::DecodeError;

/// Longest backend error body quoted in a message
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Errors that can occur while talking to the backend
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("API key is required")]
    MissingApiKey,

    #[error("Invalid backend settings: {0}")]
    InvalidSettings(String),

    #[error("Query timed out. Try reducing the time range, increasing the timeout in the backend settings, or enabling query splitting")]
    Timeout(#[source] reqwest::Error),

    #[error("Cannot connect to backend: connection refused. Check that the backend is running and the URL is correct")]
    ConnectionRefused(#[source] reqwest::Error),

    #[error("Cannot connect to backend: hostname not found. Check the URL in the backend settings")]
    HostNotFound(#[source] reqwest::Error),

    #[error("Backend closed the connection unexpectedly, the query may be too large. Try enabling query splitting or reducing the time range")]
    ConnectionClosed(#[source] reqwest::Error),

    #[error("Request to backend failed: {0}")]
    Request(#[source] reqwest::Error),

    /// Non-success status with a message
    #[error("Backend error (HTTP {status}): {message}")]
    Backend { status: u16, message: String },

    /// Non-success status with an empty body
    #[error("Backend returned HTTP {status} with no error message")]
    EmptyBackendError { status: u16 },

    #[error("Failed to decode backend response: {0}")]
    Decode(#[from] DecodeError),

    #[error("Query cancelled")]
    Cancelled,
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Kind of the first I/O error in the source chain
fn io_kind(err: &reqwest::Error) -> Option<std::io::ErrorKind> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return Some(io.kind());
        }
        source = cause.source();
    }
    None
}

/// Flattened text of an error and all its sources
fn chain_text(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text.to_lowercase()
}

impl ClientError {
    /// Classify a reqwest failure
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ClientError::Timeout(err);
        }

        let kind = io_kind(&err);
        let text = chain_text(&err);
        if kind == Some(std::io::ErrorKind::ConnectionRefused)
            || text.contains("connection refused")
        {
            ClientError::ConnectionRefused(err)
        } else if text.contains("dns error")
            || text.contains("failed to lookup address")
            || text.contains("no such host")
            || text.contains("name or service not known")
        {
            ClientError::HostNotFound(err)
        } else if matches!(
            kind,
            Some(
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            )
        ) || text.contains("connection closed")
            || text.contains("end of file before message length reached")
            || text.contains("unexpected eof")
            || text.contains("incomplete message")
            || text.contains("connection reset")
        {
            ClientError::ConnectionClosed(err)
        } else {
            ClientError::Request(err)
        }
    }

    /// Whether the failure happened below HTTP
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout(_)
                | ClientError::ConnectionRefused(_)
                | ClientError::HostNotFound(_)
                | ClientError::ConnectionClosed(_)
                | ClientError::Request(_)
        )
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
}

/// Build the error for a non-success backend response.
///
/// Uses `{"error": "..."}` when present, otherwise the trimmed body cut to
/// 500 characters.
pub fn parse_backend_error(status: u16, body: &[u8]) -> ClientError {
    if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
        if !parsed.error.is_empty() {
            return ClientError::Backend {
                status,
                message: parsed.error,
            };
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return ClientError::EmptyBackendError { status };
    }

    let message = if text.chars().count() > MAX_ERROR_BODY_CHARS {
        let mut cut: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
        cut.push_str("...");
        cut
    } else {
        text.to_string()
    };

    ClientError::Backend { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_error() {
        let err = parse_backend_error(400, br#"{"error": "table not found: cpu"}"#);
        assert_eq!(err.to_string(), "Backend error (HTTP 400): table not found: cpu");
    }

    #[test]
    fn test_parse_plain_body() {
        let err = parse_backend_error(502, b"  Bad Gateway\n");
        assert_eq!(err.to_string(), "Backend error (HTTP 502): Bad Gateway");
    }

    #[test]
    fn test_parse_empty_json_error_uses_body() {
        let err = parse_backend_error(500, br#"{"error": ""}"#);
        assert_eq!(err.to_string(), r#"Backend error (HTTP 500): {"error": ""}"#);
    }

    #[test]
    fn test_parse_empty_body() {
        let err = parse_backend_error(503, b"");
        assert_eq!(err.to_string(), "Backend returned HTTP 503 with no error message");
    }

    #[test]
    fn test_parse_long_body_truncated() {
        let body = "x".repeat(800);
        match parse_backend_error(500, body.as_bytes()) {
            ClientError::Backend { message, .. } => {
                assert_eq!(message.len(), 503);
                assert!(message.ends_with("..."));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
