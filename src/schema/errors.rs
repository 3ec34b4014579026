//! Schema error types

use thiserror::Error;

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Invalid or conflicting schema declarations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("record kind has no name")]
    EmptyKind,

    #[error("kind {0}: field declared with empty name")]
    EmptyFieldName(String),

    #[error("kind {kind}: field {field} declared more than once")]
    DuplicateField { kind: String, field: String },

    #[error("kind {0}: more than one identifier field")]
    MultipleIdentifiers(String),

    #[error("kind {0}: no identifier field declared")]
    MissingIdentifier(String),

    #[error("kind {0} is already registered with a different schema")]
    Conflict(String),

    #[error("kind {kind}: stored records violate unique field {field}")]
    StoredDataViolation { kind: String, field: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_kind() {
        let err = SchemaError::DuplicateField {
            kind: "User".into(),
            field: "email".into(),
        };
        assert_eq!(err.to_string(), "kind User: field email declared more than once");
        assert!(SchemaError::MissingIdentifier("Note".into()).to_string().contains("Note"));
    }
}
