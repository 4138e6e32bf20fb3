//! HTTP Backend Client
//!
//! Sends SQL to the backend's query endpoints:
//!
//! ```text
//! POST {url}/api/v1/query/arrow   → Arrow IPC stream (decoded as it arrives)
//! POST {url}/api/v1/query         → {"columns": [...], "data": [[...]]}
//! ```
//!
//! Both take `{"sql": "..."}`, a bearer token, and an optional
//! `X-Arc-Database` header.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::backend::QueryBackend;
use super::error::{parse_backend_error, ClientError, ClientResult};
use super::settings::BackendSettings;
use crate::decode::{decode_json, ArrowFrameDecoder};
use crate::frame::Frame;

/// Header selecting the database on the backend
pub const DATABASE_HEADER: &str = "X-Arc-Database";

const JSON_PATH: &str = "/api/v1/query";
const ARROW_PATH: &str = "/api/v1/query/arrow";

#[derive(Serialize)]
struct QueryRequest<'a> {
    sql: &'a str,
}

/// reqwest-backed [`QueryBackend`]
///
/// Holds one connection pool shared by every query and chunk.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
}

impl BackendClient {
    /// Create a client with its own connection pool
    pub fn new() -> ClientResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("chronoquery/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClientError::Request)?;
        Ok(Self { http })
    }

    async fn send(
        &self,
        settings: &BackendSettings,
        path: &str,
        sql: &str,
    ) -> ClientResult<reqwest::Response> {
        let mut request = self
            .http
            .post(settings.endpoint(path))
            .timeout(settings.timeout)
            .bearer_auth(&settings.api_key)
            .json(&QueryRequest { sql });

        if !settings.database.is_empty() {
            request = request.header(DATABASE_HEADER, &settings.database);
        }

        let response = request.send().await.map_err(ClientError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(parse_backend_error(status.as_u16(), &body));
        }

        Ok(response)
    }

    /// Query the Arrow endpoint, decoding each body chunk as it arrives
    pub async fn query_arrow(&self, settings: &BackendSettings, sql: &str) -> ClientResult<Frame> {
        let start = Instant::now();
        let mut response = self.send(settings, ARROW_PATH, sql).await?;

        let mut decoder = ArrowFrameDecoder::new(settings.correct_timestamp_units);
        let mut bytes = 0usize;
        while let Some(chunk) = response.chunk().await.map_err(ClientError::from_transport)? {
            bytes += chunk.len();
            decoder.push(&chunk)?;
        }
        let batches = decoder.batches();
        let frame = decoder.finish()?;

        tracing::debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            bytes,
            batches,
            rows = frame.rows(),
            "Arrow query completed"
        );
        Ok(frame)
    }

    /// Query the JSON endpoint
    pub async fn query_json(&self, settings: &BackendSettings, sql: &str) -> ClientResult<Frame> {
        let start = Instant::now();
        let response = self.send(settings, JSON_PATH, sql).await?;
        let body = response.bytes().await.map_err(ClientError::from_transport)?;
        let frame = decode_json(&body)?;

        tracing::debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            bytes = body.len(),
            rows = frame.rows(),
            "JSON query completed"
        );
        Ok(frame)
    }
}

#[async_trait]
impl QueryBackend for BackendClient {
    async fn execute(
        &self,
        settings: &BackendSettings,
        sql: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<Frame> {
        settings.validate()?;

        let query = async {
            if settings.use_arrow {
                self.query_arrow(settings, sql).await
            } else {
                self.query_json(settings, sql).await
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            result = query => result,
        }
    }
}
