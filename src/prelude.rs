//! Common imports for working with shelfdb
//!
//! ```ignore
//! use shelfdb::prelude::*;
//! ```

pub use crate::shelf::{Shelf, ShelfBuilder};

pub use shelf_core::{
    Error, FieldSpec, FieldType, JsonMap, KeyType, OwnerId, Result, Row, RowId, SiblingStrategy,
    StoreId, StoreRecord, StoreSchema,
};

pub use shelf_engine::{BulkItem, CreateStoreRequest, StoreUpdate};

pub use shelf_storage::{KvBackend, MemoryBackend, RetryPolicy};
