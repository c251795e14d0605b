//! Schema validation and normalization
//!
//! A pure function of (schema, data): no clock, no backend, no side
//! effects. Success returns the normalized mapping the repository stores;
//! failure names the offending field.
//!
//! Normalization is deliberately narrow: timestamp fields are reparsed
//! and rewritten in canonical RFC 3339 UTC so equality and index order
//! behave, everything else passes through unchanged. There is no type
//! coercion ("1" never becomes a number).

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use shelf_core::{FieldType, JsonMap, StoreSchema, ValidationError};

/// Validate `data` against an optional schema, producing the normalized
/// mapping to store
///
/// - Required fields must be present (`MissingField`)
/// - Present declared fields must satisfy their type (`TypeMismatch`);
///   an array validates element-wise against the declared type, which is
///   how multi-valued fields are expressed
/// - Undeclared fields are rejected when `strict`, passed through
///   untouched otherwise (`UnknownField`)
/// - No schema at all means no field-level validation
pub fn validate(
    schema: Option<&StoreSchema>,
    strict: bool,
    data: &JsonMap,
) -> Result<JsonMap, ValidationError> {
    let Some(schema) = schema else {
        return Ok(data.clone());
    };

    for (name, spec) in schema.fields() {
        if spec.required && !data.contains_key(name) {
            return Err(ValidationError::MissingField {
                field: name.to_string(),
            });
        }
    }

    let mut normalized = JsonMap::new();
    for (name, value) in data {
        match schema.field(name) {
            Some(spec) => {
                normalized.insert(name.clone(), check_value(name, spec.field_type, value)?);
            }
            None if strict => {
                return Err(ValidationError::UnknownField {
                    field: name.clone(),
                });
            }
            None => {
                normalized.insert(name.clone(), value.clone());
            }
        }
    }
    Ok(normalized)
}

fn check_value(
    field: &str,
    expected: FieldType,
    value: &Value,
) -> Result<Value, ValidationError> {
    if let Value::Array(items) = value {
        let checked = items
            .iter()
            .map(|item| check_scalar(field, expected, item))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Value::Array(checked));
    }
    check_scalar(field, expected, value)
}

fn check_scalar(
    field: &str,
    expected: FieldType,
    value: &Value,
) -> Result<Value, ValidationError> {
    let mismatch = || ValidationError::TypeMismatch {
        field: field.to_string(),
        expected,
        actual: json_type_name(value).to_string(),
    };
    match expected {
        FieldType::String => value.is_string().then(|| value.clone()).ok_or_else(mismatch),
        FieldType::Number => value.is_number().then(|| value.clone()).ok_or_else(mismatch),
        FieldType::Boolean => value.is_boolean().then(|| value.clone()).ok_or_else(mismatch),
        FieldType::Timestamp => {
            let text = value.as_str().ok_or_else(mismatch)?;
            let parsed = DateTime::parse_from_rfc3339(text).map_err(|_| mismatch())?;
            Ok(Value::String(canonical_timestamp(
                parsed.with_timezone(&Utc),
            )))
        }
    }
}

/// Canonical textual form for timestamp fields
pub fn canonical_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shelf_core::FieldSpec;

    fn map(value: serde_json::Value) -> JsonMap {
        value.as_object().expect("object literal").clone()
    }

    fn schema() -> StoreSchema {
        StoreSchema::from_fields([
            ("name", FieldSpec::of(FieldType::String).required()),
            ("age", FieldSpec::of(FieldType::Number)),
            ("active", FieldSpec::of(FieldType::Boolean)),
            ("seen_at", FieldSpec::of(FieldType::Timestamp)),
        ])
    }

    #[test]
    fn test_no_schema_accepts_anything() {
        let data = map(json!({"bar": "baz", "nested": {"x": 1}}));
        let out = validate(None, false, &data).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_missing_required_field() {
        let data = map(json!({"age": 3}));
        let err = validate(Some(&schema()), false, &data).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                field: "name".into()
            }
        );
    }

    #[test]
    fn test_type_mismatch_names_both_types() {
        let data = map(json!({"name": "a", "age": "three"}));
        let err = validate(Some(&schema()), false, &data).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TypeMismatch {
                field: "age".into(),
                expected: FieldType::Number,
                actual: "string".into(),
            }
        );
    }

    #[test]
    fn test_null_is_not_a_valid_value() {
        let data = map(json!({"name": null}));
        let err = validate(Some(&schema()), false, &data).unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));
    }

    #[test]
    fn test_permissive_passes_unknown_fields_through() {
        let data = map(json!({"name": "a", "extra": [1, 2]}));
        let out = validate(Some(&schema()), false, &data).unwrap();
        assert_eq!(out.get("extra"), Some(&json!([1, 2])));
    }

    #[test]
    fn test_strict_rejects_unknown_fields() {
        let data = map(json!({"name": "a", "extra": 1}));
        let err = validate(Some(&schema()), true, &data).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownField {
                field: "extra".into()
            }
        );
    }

    #[test]
    fn test_timestamp_normalized_to_utc_millis() {
        let data = map(json!({"name": "a", "seen_at": "2024-06-01T12:30:00+02:00"}));
        let out = validate(Some(&schema()), false, &data).unwrap();
        assert_eq!(out.get("seen_at"), Some(&json!("2024-06-01T10:30:00.000Z")));
    }

    #[test]
    fn test_garbled_timestamp_rejected() {
        let data = map(json!({"name": "a", "seen_at": "yesterday"}));
        let err = validate(Some(&schema()), false, &data).unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));
    }

    #[test]
    fn test_multi_valued_field_checked_element_wise() {
        let ok = map(json!({"name": "a", "age": [1, 2, 3]}));
        assert!(validate(Some(&schema()), false, &ok).is_ok());

        let bad = map(json!({"name": "a", "age": [1, "two"]}));
        let err = validate(Some(&schema()), false, &bad).unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));
    }

    #[test]
    fn test_no_numeric_coercion() {
        let data = map(json!({"name": "a", "age": "3"}));
        assert!(validate(Some(&schema()), false, &data).is_err());
    }

    #[test]
    fn test_validation_is_pure() {
        let data = map(json!({"name": "a", "age": 3}));
        let first = validate(Some(&schema()), false, &data).unwrap();
        let second = validate(Some(&schema()), false, &data).unwrap();
        assert_eq!(first, second);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Permissive validation of schemaless data is the identity.
            #[test]
            fn schemaless_identity(keys in proptest::collection::vec("[a-z]{1,8}", 0..6)) {
                let mut data = JsonMap::new();
                for (i, key) in keys.iter().enumerate() {
                    data.insert(key.clone(), json!(i));
                }
                let out = validate(None, false, &data).unwrap();
                prop_assert_eq!(out, data);
            }

            // A required string field is accepted iff present as a string.
            #[test]
            fn required_string_field(present in any::<bool>(), numeric in any::<bool>()) {
                let schema = StoreSchema::from_fields([
                    ("f", FieldSpec::of(FieldType::String).required()),
                ]);
                let mut data = JsonMap::new();
                if present {
                    data.insert("f".into(), if numeric { json!(1) } else { json!("v") });
                }
                let result = validate(Some(&schema), false, &data);
                prop_assert_eq!(result.is_ok(), present && !numeric);
            }
        }
    }
}
