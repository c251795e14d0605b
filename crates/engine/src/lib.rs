//! Storage and consistency engine
//!
//! The components beneath the HTTP surface, leaves first:
//!
//! - [`validator`]: normalizes candidate data against a store's schema
//! - [`indexer`]: derives the index terms a row must produce
//! - [`resolver`]: collapses concurrent row versions per store policy
//! - [`catalog`]: store metadata lifecycle
//! - [`repository`]: row CRUD composing the three leaves around the
//!   backing store
//! - [`query`]: indexed and free-text search over the repository's terms
//! - [`bulk`]: batch ingest with per-item outcomes
//!
//! Everything is a stateless facade over an `Arc<dyn KvBackend>`: no
//! in-process caches, no locks, safe for unbounded concurrent use.

pub mod bulk;
pub mod catalog;
pub mod indexer;
pub mod query;
pub mod repository;
pub mod resolver;
pub mod validator;

pub use bulk::{BulkItem, BulkOutcome, BulkProcessor, OutcomeStream};
pub use catalog::{CreateStoreRequest, StoreCatalog, StoreUpdate};
pub use query::{QueryEngine, QueryExpr, RowStream, SimpleTokenizer, Tokenizer};
pub use repository::{RowIdPage, RowRepository};
