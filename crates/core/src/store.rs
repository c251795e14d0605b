//! Store metadata records
//!
//! A store is a named, schema-optional namespace of rows belonging to one
//! owner. The record here is what the catalog persists; rows reference it
//! by `store_id` only.

use serde::{Deserialize, Serialize};

use crate::schema::StoreSchema;
use crate::types::{KeyType, OwnerId, SiblingStrategy, StoreId, Timestamps};

/// Persistent metadata for one store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    /// Unique identifier, assigned at creation, immutable
    pub store_id: StoreId,
    /// Owning account; all operations are scoped by (owner, store_id)
    pub owner: OwnerId,
    /// Client-facing tag for row key interpretation
    #[serde(default)]
    pub key_type: KeyType,
    /// Policy for collapsing concurrent row versions
    #[serde(default)]
    pub sibling_strategy: SiblingStrategy,
    /// Field declarations; `None` disables field-level validation entirely
    #[serde(default)]
    pub schema: Option<StoreSchema>,
    /// Reject fields not declared in the schema
    ///
    /// Ignored when `schema` is `None`. Defaults to permissive so
    /// partially-schematized stores keep accepting open fields.
    #[serde(default)]
    pub strict: bool,
    /// Creation and modification times; `modified_at` bumps on any
    /// metadata or schema change
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl StoreRecord {
    /// A new record with both timestamps set to now
    pub fn new(store_id: StoreId, owner: OwnerId) -> Self {
        StoreRecord {
            store_id,
            owner,
            key_type: KeyType::default(),
            sibling_strategy: SiblingStrategy::default(),
            schema: None,
            strict: false,
            timestamps: Timestamps::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, FieldType};

    #[test]
    fn test_new_store_defaults() {
        let record = StoreRecord::new(StoreId::new("s1"), OwnerId::new("owner-1"));
        assert_eq!(record.sibling_strategy, SiblingStrategy::LastWriteWins);
        assert_eq!(record.key_type, KeyType::Untyped);
        assert!(record.schema.is_none());
        assert!(!record.strict);
        assert_eq!(record.timestamps.created_at, record.timestamps.modified_at);
    }

    #[test]
    fn test_record_roundtrip_with_schema() {
        let mut record = StoreRecord::new(StoreId::new("s1"), OwnerId::new("owner-1"));
        record.schema = Some(StoreSchema::from_fields([(
            "foo",
            FieldSpec::of(FieldType::Number).indexed(),
        )]));
        record.strict = true;
        let json = serde_json::to_string(&record).unwrap();
        let back: StoreRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_missing_optional_fields_deserialize() {
        // Records written before a field existed still load.
        let json = r#"{
            "store_id": "s1",
            "owner": "o1",
            "created_at": "2024-01-01T00:00:00Z",
            "modified_at": "2024-01-01T00:00:00Z"
        }"#;
        let record: StoreRecord = serde_json::from_str(json).unwrap();
        assert!(record.schema.is_none());
        assert_eq!(record.sibling_strategy, SiblingStrategy::LastWriteWins);
    }
}
