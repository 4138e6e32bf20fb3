//! Backend Client
//!
//! Everything that crosses the network to the remote SQL engine:
//!
//! - **Settings**: immutable per-request connection settings
//! - **Backend**: the `QueryBackend` trait the query layer depends on
//! - **HTTP**: `BackendClient`, the reqwest implementation
//! - **Errors**: transport and backend error taxonomy

mod backend;
mod error;
mod http;
mod settings;

pub use backend::QueryBackend;
pub use error::{parse_backend_error, ClientError, ClientResult};
pub use http::{BackendClient, DATABASE_HEADER};
pub use settings::{BackendSettings, DEFAULT_DATABASE, DEFAULT_MAX_CONCURRENCY, DEFAULT_TIMEOUT};
