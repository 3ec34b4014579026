//! Schema validation and identifier value rules
//!
//! Structural rules, checked once when a kind is registered:
//! - kind name is non-empty
//! - field names are non-empty and distinct
//! - at most one identifier field
//!
//! Value rule, checked on every write: an identifier must not be the zero
//! value of its type (0, 0.0, "", false, null).

use std::collections::HashSet;

use serde_json::Value;

use super::errors::{SchemaError, SchemaResult};
use super::types::{FieldRole, RecordSchema};

/// Validates the structure of a schema. An identifier is not required here.
pub fn validate(schema: &RecordSchema) -> SchemaResult<()> {
    if schema.kind().is_empty() {
        return Err(SchemaError::EmptyKind);
    }

    let mut seen = HashSet::new();
    let mut identifiers = 0;
    for field in schema.fields() {
        if field.name.is_empty() {
            return Err(SchemaError::EmptyFieldName(schema.kind().to_string()));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(SchemaError::DuplicateField {
                kind: schema.kind().to_string(),
                field: field.name.clone(),
            });
        }
        if field.role == FieldRole::Identifier {
            identifiers += 1;
        }
    }

    if identifiers > 1 {
        return Err(SchemaError::MultipleIdentifiers(schema.kind().to_string()));
    }
    Ok(())
}

/// Validates the structure and additionally requires an identifier.
pub fn validate_complete(schema: &RecordSchema) -> SchemaResult<()> {
    validate(schema)?;
    if schema.identifier_field().is_none() {
        return Err(SchemaError::MissingIdentifier(schema.kind().to_string()));
    }
    Ok(())
}

/// Whether `value` is the zero value of its JSON type.
pub fn is_zero_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_schema() {
        let schema = RecordSchema::new("User").identifier("id").unique("email");
        assert!(validate(&schema).is_ok());
        assert!(validate_complete(&schema).is_ok());
    }

    #[test]
    fn test_empty_kind_rejected() {
        assert_eq!(validate(&RecordSchema::new("")), Err(SchemaError::EmptyKind));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let schema = RecordSchema::new("User").identifier("id").indexed("id");
        assert!(matches!(validate(&schema), Err(SchemaError::DuplicateField { .. })));
    }

    #[test]
    fn test_two_identifiers_rejected() {
        let schema = RecordSchema::new("User").identifier("id").identifier("uuid");
        assert_eq!(
            validate(&schema),
            Err(SchemaError::MultipleIdentifiers("User".into()))
        );
    }

    #[test]
    fn test_missing_identifier_only_fails_complete_validation() {
        let schema = RecordSchema::new("Note").indexed("title");
        assert!(validate(&schema).is_ok());
        assert_eq!(
            validate_complete(&schema),
            Err(SchemaError::MissingIdentifier("Note".into()))
        );
    }

    #[test]
    fn test_zero_values() {
        for zero in [json!(0), json!(0.0), json!(""), json!(false), json!(null)] {
            assert!(is_zero_value(&zero), "{} should be zero", zero);
        }
        for non_zero in [json!(1), json!(-3), json!(0.5), json!("a"), json!(true)] {
            assert!(!is_zero_value(&non_zero), "{} should not be zero", non_zero);
        }
    }
}
