//! Index planning
//!
//! Derives the index terms a row must produce from its validated data and
//! the store's schema. Index names are namespaced by store id so index
//! spaces never collide across stores:
//!
//! - declared fields: `"{store_id}:{field}"`
//! - structural terms every row carries: `"{store_id}:@created_at"` and
//!   `"{store_id}:@modified_at"`, valued as epoch microseconds (exactly
//!   representable in an `f64` term, fine-grained enough to keep
//!   creation order stable under rapid writes)
//!
//! The `@` prefix is reserved; the catalog rejects schemas that try to
//! declare fields under it.

use serde_json::Value;

use shelf_core::{FieldType, IndexMap, JsonMap, StoreId, StoreSchema, Timestamps};
use shelf_storage::{IndexEntry, IndexValue};

/// Name of the per-field index for `field` in `store_id`
pub fn field_index(store_id: &StoreId, field: &str) -> String {
    format!("{}:{}", store_id, field)
}

/// Name of the structural creation-time index for `store_id`
pub fn created_index(store_id: &StoreId) -> String {
    format!("{}:@created_at", store_id)
}

/// Name of the structural modification-time index for `store_id`
pub fn modified_index(store_id: &StoreId) -> String {
    format!("{}:@modified_at", store_id)
}

/// Derive every index term for one row write
///
/// Declared fields flagged `indexed` contribute one term per value
/// (multi-valued fields one per element); the two structural timestamp
/// terms are always present so recency ranges work on any store.
pub fn plan(
    store_id: &StoreId,
    schema: Option<&StoreSchema>,
    data: &JsonMap,
    timestamps: &Timestamps,
) -> Vec<IndexEntry> {
    let mut entries = vec![
        IndexEntry::new(
            created_index(store_id),
            IndexValue::Num(timestamps.created_at.timestamp_micros() as f64),
        ),
        IndexEntry::new(
            modified_index(store_id),
            IndexValue::Num(timestamps.modified_at.timestamp_micros() as f64),
        ),
    ];

    let Some(schema) = schema else {
        return entries;
    };

    for (field, spec) in schema.fields() {
        if !spec.indexed {
            continue;
        }
        let Some(value) = data.get(field) else {
            continue;
        };
        let name = field_index(store_id, field);
        match value {
            Value::Array(items) => {
                for item in items {
                    if let Some(term) = term_for(spec.field_type, item) {
                        entries.push(IndexEntry::new(name.clone(), term));
                    }
                }
            }
            scalar => {
                if let Some(term) = term_for(spec.field_type, scalar) {
                    entries.push(IndexEntry::new(name, term));
                }
            }
        }
    }
    entries
}

/// Collect planned entries into the client-visible `indexes` mapping
pub fn to_index_map(entries: &[IndexEntry]) -> IndexMap {
    let mut map = IndexMap::new();
    for entry in entries {
        let value = match &entry.value {
            IndexValue::Str(s) => Value::String(s.clone()),
            IndexValue::Num(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        };
        map.entry(entry.name.clone()).or_default().push(value);
    }
    map
}

fn term_for(field_type: FieldType, value: &Value) -> Option<IndexValue> {
    match field_type {
        FieldType::String => value.as_str().map(|s| IndexValue::Str(s.to_string())),
        FieldType::Number => value.as_f64().map(IndexValue::Num),
        FieldType::Boolean => value.as_bool().map(|b| IndexValue::Str(b.to_string())),
        // Canonical RFC 3339 UTC strings order lexicographically.
        FieldType::Timestamp => value.as_str().map(|s| IndexValue::Str(s.to_string())),
    }
}
