//! Core types for the shelf row store
//!
//! This crate defines the domain vocabulary shared by every layer:
//! - Identifiers: [`OwnerId`], [`StoreId`], [`RowId`]
//! - Store metadata: [`StoreRecord`], [`SiblingStrategy`], [`KeyType`]
//! - Schema model: [`StoreSchema`], [`FieldSpec`], [`FieldType`]
//! - Rows: [`Row`] with derived index entries
//! - The error taxonomy: [`Error`], [`ValidationError`]
//!
//! Nothing here touches a backend; these are plain values passed between
//! the engine, the storage abstraction, and the HTTP layer.

#![warn(missing_docs)]

pub mod error;
pub mod row;
pub mod schema;
pub mod store;
pub mod types;

pub use error::{Error, Result, ValidationError};
pub use row::{IndexMap, JsonMap, Row};
pub use schema::{FieldSpec, FieldType, StoreSchema};
pub use store::StoreRecord;
pub use types::{KeyType, OwnerId, RowId, SiblingStrategy, StoreId, Timestamps};
