//! Schema-as-data model
//!
//! A store's schema is a runtime-checked mapping from field name to a type
//! descriptor, not a compiled type. Schemas are optional: a store without
//! one accepts any data mapping untouched. Schema changes never rewrite
//! already-stored rows; they apply to subsequent writes only.
//!
//! The wire form mirrors the JSON clients send:
//!
//! ```json
//! {"foo": {"type": "number", "indexed": true, "required": false}}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Primitive type a schema field may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 text
    String,
    /// JSON number (integer or float)
    Number,
    /// JSON boolean
    Boolean,
    /// RFC 3339 timestamp carried as a string
    Timestamp,
}

impl FieldType {
    /// Type name used in validation failures
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Timestamp => "timestamp",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Declaration of one schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Primitive type values of this field must satisfy
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether writes derive a secondary index entry from this field
    #[serde(default)]
    pub indexed: bool,
    /// Whether the field must be present in every row
    #[serde(default)]
    pub required: bool,
}

impl FieldSpec {
    /// A plain, unindexed, optional field of the given type
    pub fn of(field_type: FieldType) -> Self {
        FieldSpec {
            field_type,
            indexed: false,
            required: false,
        }
    }

    /// Mark the field indexed
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Mark the field required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Mapping from field name to declaration
///
/// Field names are unique by construction (map keys). Names must be
/// non-empty and must not start with `@`, which is reserved for the
/// structural indexes every row carries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreSchema {
    fields: BTreeMap<String, FieldSpec>,
}

impl StoreSchema {
    /// Empty schema (validates everything when attached to a store)
    pub fn new() -> Self {
        StoreSchema::default()
    }

    /// Build a schema from (name, spec) pairs
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldSpec)>,
        S: Into<String>,
    {
        StoreSchema {
            fields: fields
                .into_iter()
                .map(|(name, spec)| (name.into(), spec))
                .collect(),
        }
    }

    /// Look up one field's declaration
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// Iterate all declared fields in name order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    /// Number of declared fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no fields are declared
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check field names against the naming rules
    ///
    /// Called when a schema enters the catalog; data validation assumes
    /// names have already passed.
    pub fn check_field_names(&self) -> Result<()> {
        for name in self.fields.keys() {
            if name.is_empty() {
                return Err(Error::InvalidSchema("field name is empty".to_string()));
            }
            if name.starts_with('@') {
                return Err(Error::InvalidSchema(format!(
                    "field name '{}' uses reserved '@' prefix",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_wire_shape() {
        let json = r#"{"foo": {"type": "number", "indexed": true}}"#;
        let schema: StoreSchema = serde_json::from_str(json).unwrap();
        let spec = schema.field("foo").expect("field present");
        assert_eq!(spec.field_type, FieldType::Number);
        assert!(spec.indexed);
        assert!(!spec.required, "required defaults to false");
    }

    #[test]
    fn test_schema_roundtrip() {
        let schema = StoreSchema::from_fields([
            ("name", FieldSpec::of(FieldType::String).required()),
            ("age", FieldSpec::of(FieldType::Number).indexed()),
        ]);
        let json = serde_json::to_string(&schema).unwrap();
        let back: StoreSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(schema, back);
    }

    #[test]
    fn test_field_names_unique_by_construction() {
        let schema = StoreSchema::from_fields([
            ("dup", FieldSpec::of(FieldType::String)),
            ("dup", FieldSpec::of(FieldType::Number)),
        ]);
        assert_eq!(schema.len(), 1, "later declaration wins, no duplicates");
    }

    #[test]
    fn test_reserved_prefix_rejected() {
        let schema = StoreSchema::from_fields([("@created_at", FieldSpec::of(FieldType::Number))]);
        assert!(schema.check_field_names().is_err());
    }

    #[test]
    fn test_empty_name_rejected() {
        let schema = StoreSchema::from_fields([("", FieldSpec::of(FieldType::String))]);
        assert!(schema.check_field_names().is_err());
    }

    #[test]
    fn test_plain_names_accepted() {
        let schema = StoreSchema::from_fields([("msisdn", FieldSpec::of(FieldType::String))]);
        assert!(schema.check_field_names().is_ok());
    }
}
