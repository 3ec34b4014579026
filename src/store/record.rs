//! Typed records and the JSON boundary between them and storage

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::errors::{StoreError, StoreResult};
use crate::index::IndexKey;
use crate::schema::{is_zero_value, RecordSchema};

/// A value stored in a record bucket.
///
/// ```
/// use bucketdb::schema::RecordSchema;
/// use bucketdb::store::Record;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct User {
///     id: u64,
///     email: String,
/// }
///
/// impl Record for User {
///     fn schema() -> RecordSchema {
///         RecordSchema::new("User").identifier("id").unique("email")
///     }
/// }
/// ```
pub trait Record: Serialize + DeserializeOwned {
    /// Schema for every value of this type. Must return the same schema on
    /// every call.
    fn schema() -> RecordSchema;
}

/// A record serialized and keyed, ready to be written.
#[derive(Debug)]
pub(crate) struct EncodedRecord {
    pub id: IndexKey,
    pub key: Vec<u8>,
    pub body: Value,
}

impl EncodedRecord {
    pub fn encode<T: Record>(schema: &RecordSchema, record: &T) -> StoreResult<Self> {
        let body = serde_json::to_value(record).map_err(|e| StoreError::BadType(e.to_string()))?;
        Self::from_body(schema, body)
    }

    pub fn from_body(schema: &RecordSchema, body: Value) -> StoreResult<Self> {
        let kind = schema.kind();
        let id_field = require_identifier(schema)?;
        if !body.is_object() {
            return Err(StoreError::BadType(format!(
                "kind {}: record must serialize to an object",
                kind
            )));
        }

        let id_value = body
            .get(id_field)
            .ok_or_else(|| StoreError::NoIdentifier(kind.to_string()))?;
        if is_zero_value(id_value) {
            return Err(StoreError::ZeroIdentifier(kind.to_string()));
        }
        let id = IndexKey::from_json(id_value).ok_or_else(|| {
            StoreError::BadType(format!("kind {}: identifier must be a scalar", kind))
        })?;

        Ok(Self {
            key: encode_id(&id)?,
            id,
            body,
        })
    }
}

pub(crate) fn require_identifier(schema: &RecordSchema) -> StoreResult<&str> {
    schema
        .identifier_field()
        .ok_or_else(|| StoreError::NoIdentifier(schema.kind().to_string()))
}

pub(crate) fn encode_id(id: &IndexKey) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(&id.to_json()).map_err(|e| StoreError::BadType(e.to_string()))
}

pub(crate) fn decode_id(key: &[u8]) -> Option<IndexKey> {
    serde_json::from_slice::<Value>(key)
        .ok()
        .as_ref()
        .and_then(IndexKey::from_json)
}

/// Encodes a lookup value. Null is a missing parameter, composites cannot be looked up.
pub(crate) fn lookup_key<V: Serialize + ?Sized>(value: &V) -> StoreResult<IndexKey> {
    let value = serde_json::to_value(value).map_err(|e| StoreError::BadType(e.to_string()))?;
    if value.is_null() {
        return Err(StoreError::NilParameter("value"));
    }
    IndexKey::from_json(&value)
        .ok_or_else(|| StoreError::BadType("lookup value must be a scalar".to_string()))
}

pub(crate) fn decode_record<T: DeserializeOwned>(body: &Value) -> StoreResult<T> {
    T::deserialize(body).map_err(|e| StoreError::BadType(e.to_string()))
}

/// Whether `body.field` equals `key`.
pub(crate) fn field_matches(body: &Value, field: &str, key: &IndexKey) -> bool {
    body.get(field)
        .and_then(IndexKey::from_json)
        .is_some_and(|k| &k == key)
}
