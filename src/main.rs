//! Chronoquery Server
//!
//! Loads configuration, builds the backend client and serves the REST API.

use chronoquery::api::{serve, AppState};
use chronoquery::client::BackendClient;
use chronoquery::config::Config;
use chronoquery::logging::init_logging;
use chronoquery::query::QueryExecutor;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // An explicit path is an error if it cannot be loaded
    let config = match std::env::var("CHRONOQUERY_CONFIG") {
        Ok(path) => Config::load_with_env(&PathBuf::from(path))?,
        Err(_) => Config::load_default(),
    };

    init_logging(&config.logging)?;

    tracing::info!("Chronoquery v{}", env!("CARGO_PKG_VERSION"));

    let settings = config.backend.to_settings();
    settings.validate()?;

    tracing::info!(
        url = %settings.url,
        database = %settings.database,
        use_arrow = settings.use_arrow,
        split_duration = %settings.split_duration,
        max_concurrency = settings.max_concurrency,
        "Backend configured"
    );

    let client = Arc::new(BackendClient::new()?);
    let executor = Arc::new(QueryExecutor::new(client));
    let state = AppState::new(executor, settings, config.api.clone());

    serve(state, &config.api).await?;

    tracing::info!("Chronoquery shutdown complete");
    Ok(())
}
