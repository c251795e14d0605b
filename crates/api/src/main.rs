//! `shelfd`: row store service binary
//!
//! Usage: `shelfd [config.toml]`. Runs over the bundled in-memory backend;
//! deployments against a real distributed store swap the backend at the
//! [`shelf_api::AppState`] seam.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use shelf_api::{serve, AppState, ServerConfig};
use shelf_storage::MemoryBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = ServerConfig::load(config_path.as_deref()).context("loading configuration")?;

    let backend = Arc::new(MemoryBackend::new());
    let state = AppState::new(backend, config.retry_policy());

    serve(config, state).await.context("serving")?;
    Ok(())
}
