//! Facade wiring the engine stack over one backend

use std::sync::Arc;

use shelf_engine::{BulkProcessor, QueryEngine, RowRepository, StoreCatalog};
use shelf_storage::{KvBackend, MemoryBackend, RetryPolicy};

/// Entry point: the engine components wired over a shared backend
///
/// Cheap to clone; every component is a stateless facade over the same
/// `Arc<dyn KvBackend>`, so clones and concurrent calls are free of
/// coordination.
#[derive(Clone)]
pub struct Shelf {
    catalog: StoreCatalog,
    repository: RowRepository,
    query: QueryEngine,
    bulk: BulkProcessor,
}

impl Shelf {
    /// Start building a shelf over a chosen backend
    pub fn builder() -> ShelfBuilder {
        ShelfBuilder::default()
    }

    /// A shelf over the bundled in-memory backend
    pub fn memory() -> Self {
        Shelf::builder().build()
    }

    /// Store metadata operations
    pub fn stores(&self) -> &StoreCatalog {
        &self.catalog
    }

    /// Row operations
    pub fn rows(&self) -> &RowRepository {
        &self.repository
    }

    /// Search
    pub fn query(&self) -> &QueryEngine {
        &self.query
    }

    /// Batch ingest
    pub fn bulk(&self) -> &BulkProcessor {
        &self.bulk
    }
}

/// Configures and assembles a [`Shelf`]
#[derive(Default)]
pub struct ShelfBuilder {
    backend: Option<Arc<dyn KvBackend>>,
    retry: Option<RetryPolicy>,
}

impl ShelfBuilder {
    /// Use a specific backend (a real deployment's distributed store)
    pub fn backend(mut self, backend: Arc<dyn KvBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Tune the backoff applied to transient backend failures
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Assemble; defaults to the in-memory backend
    pub fn build(self) -> Shelf {
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(MemoryBackend::new()));
        let retry = self.retry.unwrap_or_default();
        let catalog = StoreCatalog::new(backend.clone(), retry);
        let repository = RowRepository::new(backend.clone(), catalog.clone(), retry);
        let query = QueryEngine::new(backend, repository.clone());
        let bulk = BulkProcessor::new(repository.clone());
        Shelf {
            catalog,
            repository,
            query,
            bulk,
        }
    }
}
