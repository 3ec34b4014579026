//! Store error taxonomy
//!
//! A closed set of error kinds. Callers match on the variant (or its stable
//! `code()`); nothing is compared by identity.

use thiserror::Error;

use crate::schema::SchemaError;
use crate::storage::StorageError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing file could not be opened, is locked, or the store is not connected
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<StorageError>,
    },

    /// Invalid or conflicting schema declaration
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The record kind declares no identifier field, or the record lacks it
    #[error("kind {0} has no identifier field")]
    NoIdentifier(String),

    /// The identifier holds its type's zero value
    #[error("kind {0}: identifier is the zero value")]
    ZeroIdentifier(String),

    /// A unique field value is already held by another record
    #[error("kind {kind}: value {value} of unique field {field} already exists")]
    Duplicate {
        kind: String,
        field: String,
        value: serde_json::Value,
    },

    /// No record or key matched
    #[error("not found")]
    NotFound,

    /// A value could not be encoded, or stored data does not decode into the requested type
    #[error("bad type: {0}")]
    BadType(String),

    /// Lookup by a field that has no index
    #[error("kind {kind}: field {field} is not indexed")]
    IndexNotFound { kind: String, field: String },

    /// The new field value does not fit the record
    #[error("incompatible value: {0}")]
    IncompatibleValue(String),

    /// Commit or rollback outside a transaction. Every operation here commits
    /// on its own, so no store method returns this kind.
    #[error("not in transaction")]
    NotInTransaction,

    /// A required parameter was null or empty
    #[error("nil parameter: {0}")]
    NilParameter(&'static str),

    /// I/O failure on an open store
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl StoreError {
    pub(crate) fn not_connected() -> Self {
        StoreError::Connection {
            message: "store is not connected".to_string(),
            source: None,
        }
    }

    pub(crate) fn open_failed(location: &std::path::Path, source: StorageError) -> Self {
        StoreError::Connection {
            message: format!("cannot open {}", location.display()),
            source: Some(source),
        }
    }

    /// Returns the stable string code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Connection { .. } => "BUCKETDB_CONNECTION",
            StoreError::Schema(_) => "BUCKETDB_SCHEMA",
            StoreError::NoIdentifier(_) => "BUCKETDB_NO_IDENTIFIER",
            StoreError::ZeroIdentifier(_) => "BUCKETDB_ZERO_IDENTIFIER",
            StoreError::Duplicate { .. } => "BUCKETDB_DUPLICATE",
            StoreError::NotFound => "BUCKETDB_NOT_FOUND",
            StoreError::BadType(_) => "BUCKETDB_BAD_TYPE",
            StoreError::IndexNotFound { .. } => "BUCKETDB_INDEX_NOT_FOUND",
            StoreError::IncompatibleValue(_) => "BUCKETDB_INCOMPATIBLE_VALUE",
            StoreError::NotInTransaction => "BUCKETDB_NOT_IN_TRANSACTION",
            StoreError::NilParameter(_) => "BUCKETDB_NIL_PARAMETER",
            StoreError::Storage(e) => e.code().code(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            StoreError::not_connected(),
            StoreError::Schema(SchemaError::EmptyKind),
            StoreError::NoIdentifier("User".into()),
            StoreError::ZeroIdentifier("User".into()),
            StoreError::Duplicate {
                kind: "User".into(),
                field: "email".into(),
                value: serde_json::json!("a@x.com"),
            },
            StoreError::NotFound,
            StoreError::BadType("x".into()),
            StoreError::IndexNotFound {
                kind: "User".into(),
                field: "name".into(),
            },
            StoreError::IncompatibleValue("x".into()),
            StoreError::NotInTransaction,
            StoreError::NilParameter("key"),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_connection_error_keeps_storage_source() {
        let storage = StorageError::locked(std::path::Path::new("/tmp/app.db"));
        let err = StoreError::open_failed(std::path::Path::new("/tmp/app.db"), storage);
        assert_eq!(err.code(), "BUCKETDB_CONNECTION");
        assert!(err.source().unwrap().to_string().contains("BUCKETDB_STORAGE_LOCKED"));
    }

    #[test]
    fn test_storage_error_code_passes_through() {
        let err = StoreError::from(StorageError::data_corruption("bad frame"));
        assert_eq!(err.code(), "BUCKETDB_DATA_CORRUPTION");
    }
}
