//! HTTP surface
//!
//! Thin routing/codec layer over the engine: decodes requests into
//! catalog/repository/query/bulk operations and encodes their results
//! into the JSON envelope. Owns nothing the engine cares about: no
//! authentication (an upstream proxy's job), no storage state.
//!
//! ## Envelope
//!
//! Every JSON body carries a `success` boolean. Successes add payload
//! fields beside it; failures add a `reason` string. The HTTP status
//! mirrors the failure class, but the body flag is the authoritative
//! machine-readable signal.
//!
//! ## Streaming
//!
//! Search results and bulk-upload outcomes are newline-delimited JSON,
//! one envelope per line, produced from the engine's lazy streams. A
//! client that disconnects mid-stream simply cancels the producer.

pub mod config;
pub mod envelope;
pub mod routes;

use std::sync::Arc;

use shelf_engine::{BulkProcessor, QueryEngine, RowRepository, StoreCatalog};
use shelf_storage::{KvBackend, RetryPolicy};

pub use config::{ConfigError, ServerConfig};
pub use routes::router;

/// Engine handles shared by every request handler
#[derive(Clone)]
pub struct AppState {
    /// Store metadata operations
    pub catalog: StoreCatalog,
    /// Row operations
    pub repository: RowRepository,
    /// Search
    pub query: QueryEngine,
    /// Batch ingest
    pub bulk: BulkProcessor,
}

impl AppState {
    /// Wire the engine stack over one backend
    pub fn new(backend: Arc<dyn KvBackend>, retry: RetryPolicy) -> Self {
        let catalog = StoreCatalog::new(backend.clone(), retry);
        let repository = RowRepository::new(backend.clone(), catalog.clone(), retry);
        let query = QueryEngine::new(backend, repository.clone());
        let bulk = BulkProcessor::new(repository.clone());
        AppState {
            catalog,
            repository,
            query,
            bulk,
        }
    }
}

/// Failures that can stop the server before it accepts traffic
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration file problems
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Listener or accept-loop failure
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bind and serve until the process is stopped
pub async fn serve(config: ServerConfig, state: AppState) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(bind = %config.bind, "listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
