//! Row records
//!
//! A row holds a schema-validated `data` mapping plus the index entries
//! derived from it. Index entries are never client-settable; the engine
//! recomputes them on every write and after every sibling resolution.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{RowId, StoreId, Timestamps};

/// JSON object carried as row data
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Derived index entries, index name to the values indexed under it
///
/// Multi-valued fields contribute several values under one name.
pub type IndexMap = BTreeMap<String, Vec<serde_json::Value>>;

/// One record within a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Per-store unique identifier, immutable once assigned
    pub row_id: RowId,
    /// Owning store, immutable
    pub store_id: StoreId,
    /// Creation and modification times
    #[serde(flatten)]
    pub timestamps: Timestamps,
    /// Index entries derived from `data`; not independently settable
    pub indexes: IndexMap,
    /// Field values, validated against the store's schema at write time
    pub data: JsonMap,
}

impl Row {
    /// Canonical serialization of `data` with deterministic key order
    ///
    /// Serves as the stable secondary key when ordering concurrent
    /// versions whose `modified_at` collide.
    pub fn canonical_data(&self) -> String {
        // serde_json maps are BTreeMap-backed, so serialization is
        // already key-ordered.
        serde_json::to_string(&self.data).unwrap_or_default()
    }
}
