//! Response Decoding
//!
//! Turns backend response bodies into [`Frame`](crate::frame::Frame)s:
//!
//! - **Arrow IPC**: decoded batch by batch as bytes arrive
//! - **JSON**: `{columns, data}` rows with per-column type inference

mod error;
mod ipc;
mod json;

pub use error::{DecodeError, DecodeResult};
pub use ipc::{decode_arrow_stream, effective_timestamp_unit, to_millis, ArrowFrameDecoder};
pub use json::{decode_json, decode_json_value, parse_timestamp};

#[cfg(test)]
pub(crate) use ipc::encode_batches;
