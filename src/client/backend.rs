//! The seam between query orchestration and the remote engine

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::error::ClientResult;
use super::settings::BackendSettings;
use crate::frame::Frame;

/// A columnar SQL engine that can run one fully expanded statement
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Run `sql` and decode the response into a frame.
    ///
    /// Implementations must return [`ClientError::Cancelled`] promptly once
    /// `cancel` fires.
    ///
    /// [`ClientError::Cancelled`]: super::ClientError::Cancelled
    async fn execute(
        &self,
        settings: &BackendSettings,
        sql: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<Frame>;
}
