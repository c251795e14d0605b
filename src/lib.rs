//! # shelfdb
//!
//! Schema-aware row store over an eventually-consistent key-value
//! backend. Data is organized into named, per-owner stores (tables),
//! each holding rows validated against an optional field schema.
//!
//! ## Quick Start
//!
//! ```ignore
//! use shelfdb::prelude::*;
//!
//! let shelf = Shelf::memory();
//! let owner = OwnerId::new("acme");
//!
//! // Create a schematized store
//! let store = shelf.stores().create_store(&owner, CreateStoreRequest {
//!     schema: Some(StoreSchema::from_fields([
//!         ("city", FieldSpec::of(FieldType::String).indexed()),
//!     ])),
//!     ..Default::default()
//! }).await?;
//!
//! // Write and search rows
//! shelf.rows().create_row(&owner, &store.store_id, None, &data).await?;
//! let mut hits = shelf.query().search(&owner, &store.store_id, "city:berlin").await?;
//! ```
//!
//! ## Pieces
//!
//! - [`Shelf`]: facade wiring the engine over one backend
//! - `shelf_engine`: validation, index planning, sibling resolution,
//!   catalog, repository, query, bulk ingest
//! - `shelf_storage`: the backing-store contract and the bundled
//!   in-memory backend
//! - `shelf_api`: the HTTP surface (`shelfd` binary)
//!
//! Concurrent writers to one row are expected and survivable: they leave
//! sibling versions behind, and reads collapse them per the store's
//! [`SiblingStrategy`].

#![warn(missing_docs)]

mod shelf;

pub mod prelude;

pub use shelf::{Shelf, ShelfBuilder};

// Re-export the domain vocabulary
pub use shelf_core::{
    Error, FieldSpec, FieldType, IndexMap, JsonMap, KeyType, OwnerId, Result, Row, RowId,
    SiblingStrategy, StoreId, StoreRecord, StoreSchema, Timestamps, ValidationError,
};

// Re-export the operation surfaces
pub use shelf_engine::{
    BulkItem, BulkOutcome, BulkProcessor, CreateStoreRequest, OutcomeStream, QueryEngine,
    RowIdPage, RowRepository, RowStream, StoreCatalog, StoreUpdate,
};

// Re-export the backend seam
pub use shelf_storage::{KvBackend, MemoryBackend, RetryPolicy};
