//! The record store handle
//!
//! `Store` is cheap to share across threads (`Arc<Store>`); every operation
//! takes `&self`. Each mutating operation writes exactly one log frame and
//! applies it in memory only once the frame is durable.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::bucket::{RecordBucket, RecordRow};
use super::engine::{read_lock, write_lock, Engine};
use super::errors::{StoreError, StoreResult};
use super::record::{
    decode_record, field_matches, lookup_key, require_identifier, EncodedRecord, Record,
};
use crate::index::IndexKey;
use crate::observability::Event;
use crate::schema::{self, RecordSchema};
use crate::storage::{LogFrame, LogOp, Namespace};

/// An embedded record store backed by a single file.
pub struct Store {
    location: PathBuf,
    engine: RwLock<Option<Arc<Engine>>>,
}

impl Store {
    /// Creates an unconnected store for `location`.
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            engine: RwLock::new(None),
        }
    }

    /// Creates a store and connects it.
    pub fn open(location: impl Into<PathBuf>) -> StoreResult<Self> {
        let store = Self::new(location);
        store.connect()?;
        Ok(store)
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Opens or creates the backing file and replays it.
    ///
    /// Calling this on a connected store does nothing.
    pub fn connect(&self) -> StoreResult<()> {
        let mut slot = write_lock(&self.engine);
        if slot.is_some() {
            return Ok(());
        }

        let (engine, stats) = Engine::open(&self.location)
            .map_err(|e| StoreError::open_failed(&self.location, e))?;

        let location = self.location.display().to_string();
        if let Some(reason) = &stats.torn_tail {
            Event::StoreTornTailTruncated.emit(&[("location", &location), ("reason", reason)]);
        }
        Event::StoreConnect.emit(&[
            ("location", &location),
            ("frames", &stats.frames.to_string()),
            ("record_buckets", &stats.record_buckets.to_string()),
            ("kv_buckets", &stats.kv_buckets.to_string()),
        ]);

        *slot = Some(Arc::new(engine));
        Ok(())
    }

    /// Releases the backing file. Safe to call when not connected.
    pub fn close(&self) {
        let engine = write_lock(&self.engine).take();
        if engine.is_some() {
            Event::StoreClose.emit(&[("location", &self.location.display().to_string())]);
        }
    }

    pub fn is_connected(&self) -> bool {
        read_lock(&self.engine).is_some()
    }

    fn engine(&self) -> StoreResult<Arc<Engine>> {
        read_lock(&self.engine)
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(StoreError::not_connected)
    }

    /// Registers `T`'s schema and builds its indexes ahead of first use.
    pub fn init<T: Record>(&self) -> StoreResult<()> {
        let engine = self.engine()?;
        let declared = T::schema();
        schema::validate_complete(&declared)?;
        let schema = engine.schema(declared)?;
        engine.with_records(&schema, |_| Ok(()))
    }

    /// Stores `record`, replacing any record with the same identifier.
    pub fn save<T: Record>(&self, record: &T) -> StoreResult<()> {
        let engine = self.engine()?;
        let schema = engine.schema(T::schema())?;
        let encoded = EncodedRecord::encode(&schema, record)?;

        engine.with_records_mut(&schema, |bucket| {
            write_record(&engine, &schema, bucket, encoded)
        })
    }

    /// Returns the record whose `field` equals `value`.
    ///
    /// `field` must be the identifier or an indexed field.
    pub fn one<T, V>(&self, field: &str, value: &V) -> StoreResult<T>
    where
        T: Record,
        V: Serialize + ?Sized,
    {
        require_field(field)?;
        let key = lookup_key(value)?;
        let engine = self.engine()?;
        let schema = engine.schema(T::schema())?;
        let id_field = require_identifier(&schema)?;

        engine.with_records(&schema, |bucket| {
            let row = if field == id_field {
                bucket.get(&key)
            } else {
                let tree = bucket
                    .indexes()
                    .tree(field)
                    .ok_or_else(|| index_not_found(&schema, field))?;
                bucket
                    .rows_by_insertion(&tree.lookup_eq(&key))
                    .into_iter()
                    .next()
            };
            row.map(|r| decode_record(&r.body))
                .unwrap_or(Err(StoreError::NotFound))
        })
    }

    /// Returns every record whose `field` equals `value`, in insertion order.
    ///
    /// Fields without an index are matched by scanning the bucket.
    pub fn find<T, V>(&self, field: &str, value: &V) -> StoreResult<Vec<T>>
    where
        T: Record,
        V: Serialize + ?Sized,
    {
        require_field(field)?;
        let key = lookup_key(value)?;
        let engine = self.engine()?;
        let schema = engine.schema(T::schema())?;
        let id_field = require_identifier(&schema)?;

        engine.with_records(&schema, |bucket| {
            let ids = matching_ids(bucket, id_field, field, &key);
            decode_rows(bucket.rows_by_insertion(&ids))
        })
    }

    /// Returns every record ordered by `field`'s index.
    ///
    /// An empty `field` or the identifier field orders by identifier.
    pub fn all_by_index<T: Record>(&self, field: &str) -> StoreResult<Vec<T>> {
        let engine = self.engine()?;
        let schema = engine.schema(T::schema())?;
        let id_field = require_identifier(&schema)?;

        engine.with_records(&schema, |bucket| {
            if field.is_empty() || field == id_field {
                return decode_rows(bucket.rows_by_id());
            }
            let tree = bucket
                .indexes()
                .tree(field)
                .ok_or_else(|| index_not_found(&schema, field))?;
            decode_rows(tree.ordered_ids().iter().filter_map(|id| bucket.get(id)))
        })
    }

    /// Returns every record in insertion order.
    pub fn all<T: Record>(&self) -> StoreResult<Vec<T>> {
        let engine = self.engine()?;
        let schema = engine.schema(T::schema())?;
        require_identifier(&schema)?;

        engine.with_records(&schema, |bucket| {
            decode_rows(bucket.iter_in_order().map(|(_, row)| row))
        })
    }

    /// Returns every record whose string `field` starts with `prefix`,
    /// ordered by that field.
    pub fn prefix<T: Record>(&self, field: &str, prefix: &str) -> StoreResult<Vec<T>> {
        require_field(field)?;
        let engine = self.engine()?;
        let schema = engine.schema(T::schema())?;
        let id_field = require_identifier(&schema)?;

        engine.with_records(&schema, |bucket| {
            if field == id_field {
                return decode_rows(bucket.rows_by_id().into_iter().filter(|row| {
                    row.body
                        .get(field)
                        .and_then(Value::as_str)
                        .is_some_and(|s| s.starts_with(prefix))
                }));
            }
            if let Some(tree) = bucket.indexes().tree(field) {
                return decode_rows(tree.lookup_prefix(prefix).iter().filter_map(|id| bucket.get(id)));
            }

            let mut hits: Vec<(&str, &RecordRow)> = bucket
                .iter_in_order()
                .filter_map(|(_, row)| {
                    let s = row.body.get(field).and_then(Value::as_str)?;
                    s.starts_with(prefix).then_some((s, row))
                })
                .collect();
            hits.sort_by(|a, b| a.0.cmp(b.0).then(a.1.seq.cmp(&b.1.seq)));
            decode_rows(hits.into_iter().map(|(_, row)| row))
        })
    }

    /// Removes the record with `record`'s identifier.
    pub fn delete<T: Record>(&self, record: &T) -> StoreResult<()> {
        let engine = self.engine()?;
        let schema = engine.schema(T::schema())?;
        let encoded = EncodedRecord::encode(&schema, record)?;

        engine.with_records_mut(&schema, |bucket| {
            if !bucket.contains(&encoded.id) {
                return Err(StoreError::NotFound);
            }
            engine.commit(&LogFrame::single(LogOp::delete(
                Namespace::Records,
                schema.kind(),
                encoded.key,
            )))?;
            bucket.remove(&encoded.id);
            Ok(())
        })
    }

    /// Removes every record of `T` whose `field` equals `value` and returns
    /// how many were removed. No match is not an error.
    pub fn delete_by_field<T, V>(&self, field: &str, value: &V) -> StoreResult<usize>
    where
        T: Record,
        V: Serialize + ?Sized,
    {
        require_field(field)?;
        let key = lookup_key(value)?;
        let engine = self.engine()?;
        let schema = engine.schema(T::schema())?;
        let id_field = require_identifier(&schema)?;

        engine.with_records_mut(&schema, |bucket| {
            let ids = matching_ids(bucket, id_field, field, &key);
            if ids.is_empty() {
                return Ok(0);
            }
            let mut ops = Vec::with_capacity(ids.len());
            for id in &ids {
                ops.push(LogOp::delete(
                    Namespace::Records,
                    schema.kind(),
                    super::record::encode_id(id)?,
                ));
            }
            engine.commit(&LogFrame::new(ops))?;
            for id in &ids {
                bucket.remove(id);
            }
            Ok(ids.len())
        })
    }

    /// Replaces the stored record that has `record`'s identifier.
    pub fn update<T: Record>(&self, record: &T) -> StoreResult<()> {
        let engine = self.engine()?;
        let schema = engine.schema(T::schema())?;
        let encoded = EncodedRecord::encode(&schema, record)?;

        engine.with_records_mut(&schema, |bucket| {
            if !bucket.contains(&encoded.id) {
                return Err(StoreError::NotFound);
            }
            write_record(&engine, &schema, bucket, encoded)
        })
    }

    /// Sets one field of the stored record that has `record`'s identifier,
    /// then refreshes `record` from the stored result.
    pub fn update_field<T, V>(&self, record: &mut T, field: &str, value: &V) -> StoreResult<()>
    where
        T: Record,
        V: Serialize + ?Sized,
    {
        require_field(field)?;
        let engine = self.engine()?;
        let schema = engine.schema(T::schema())?;
        let id_field = require_identifier(&schema)?;
        if field == id_field {
            return Err(StoreError::IncompatibleValue(format!(
                "kind {}: identifier field {} cannot be updated",
                schema.kind(),
                field
            )));
        }
        let encoded = EncodedRecord::encode(&schema, &*record)?;
        let new_value =
            serde_json::to_value(value).map_err(|e| StoreError::BadType(e.to_string()))?;

        let updated: T = engine.with_records_mut(&schema, |bucket| {
            let row = bucket.get(&encoded.id).ok_or(StoreError::NotFound)?;
            let mut body = row.body.clone();
            let Some(fields) = body.as_object_mut().filter(|o| o.contains_key(field)) else {
                return Err(StoreError::IncompatibleValue(format!(
                    "kind {}: stored record has no field {}",
                    schema.kind(),
                    field
                )));
            };
            fields.insert(field.to_string(), new_value);

            let updated: T = serde_json::from_value(body).map_err(|e| {
                StoreError::IncompatibleValue(format!("field {}: {}", field, e))
            })?;
            let canonical = EncodedRecord::encode(&schema, &updated)?;
            if canonical.id != encoded.id {
                return Err(StoreError::IncompatibleValue(format!(
                    "field {}: value changes the record identifier",
                    field
                )));
            }
            write_record(&engine, &schema, bucket, canonical)?;
            Ok(updated)
        })?;

        *record = updated;
        Ok(())
    }

    /// Removes every record of `T` along with its indexes.
    pub fn clear_db<T: Record>(&self) -> StoreResult<()> {
        let engine = self.engine()?;
        let schema = engine.schema(T::schema())?;
        engine.drop_records(schema.kind())
    }

    /// Reads the value stored under `key` in the raw bucket `bucket`.
    pub fn get_key<K, V>(&self, bucket: &str, key: &K) -> StoreResult<V>
    where
        K: Serialize + ?Sized,
        V: DeserializeOwned,
    {
        require_bucket(bucket)?;
        let key = encode_kv_key(key)?;
        let engine = self.engine()?;

        let raw = engine
            .with_kv(bucket, |b| b.entries.get(&key).cloned())
            .flatten()
            .ok_or(StoreError::NotFound)?;
        serde_json::from_slice(&raw).map_err(|e| StoreError::BadType(e.to_string()))
    }

    /// Stores `value` under `key` in the raw bucket `bucket`, creating the
    /// bucket if needed.
    pub fn set_key<K, V>(&self, bucket: &str, key: &K, value: &V) -> StoreResult<()>
    where
        K: Serialize + ?Sized,
        V: Serialize + ?Sized,
    {
        require_bucket(bucket)?;
        let key = encode_kv_key(key)?;
        let value = serde_json::to_vec(value).map_err(|e| StoreError::BadType(e.to_string()))?;
        let engine = self.engine()?;

        engine.with_kv_mut(bucket, |b| {
            engine.commit(&LogFrame::single(LogOp::put(
                Namespace::KeyValue,
                bucket,
                key.clone(),
                value.clone(),
            )))?;
            b.entries.insert(key, value);
            Ok(())
        })
    }

    /// Removes `key` from the raw bucket `bucket`. Absent keys are not an error.
    pub fn delete_key<K: Serialize + ?Sized>(&self, bucket: &str, key: &K) -> StoreResult<()> {
        require_bucket(bucket)?;
        let key = encode_kv_key(key)?;
        let engine = self.engine()?;

        if !engine.with_kv(bucket, |b| b.entries.contains_key(&key)).unwrap_or(false) {
            return Ok(());
        }
        engine.with_kv_mut(bucket, |b| {
            if !b.entries.contains_key(&key) {
                return Ok(());
            }
            engine.commit(&LogFrame::single(LogOp::delete(
                Namespace::KeyValue,
                bucket,
                key.clone(),
            )))?;
            b.entries.remove(&key);
            Ok(())
        })
    }

    /// Rewrites the backing file to hold only live data.
    pub fn compact(&self) -> StoreResult<()> {
        let engine = self.engine()?;
        let (before, after) = engine.compact()?;
        Event::StoreCompact.emit(&[
            ("location", &self.location.display().to_string()),
            ("bytes_before", &before.to_string()),
            ("bytes_after", &after.to_string()),
        ]);
        Ok(())
    }

    /// Current size of the backing file in bytes.
    pub fn log_size(&self) -> StoreResult<u64> {
        Ok(self.engine()?.log_size())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.close();
    }
}

/// Checks unique fields, appends the put and applies it.
fn write_record(
    engine: &Engine,
    schema: &RecordSchema,
    bucket: &mut RecordBucket,
    encoded: EncodedRecord,
) -> StoreResult<()> {
    bucket
        .indexes()
        .check_unique(&encoded.id, &encoded.body)
        .map_err(|v| StoreError::Duplicate {
            kind: schema.kind().to_string(),
            value: v.value.to_json(),
            field: v.field,
        })?;
    let value = serde_json::to_vec(&encoded.body).map_err(|e| StoreError::BadType(e.to_string()))?;
    engine.commit(&LogFrame::single(LogOp::put(
        Namespace::Records,
        schema.kind(),
        encoded.key,
        value,
    )))?;
    bucket.put(encoded.id, encoded.body);
    Ok(())
}

/// Ids of rows whose `field` equals `key`, using the identifier or an index
/// when possible.
fn matching_ids(bucket: &RecordBucket, id_field: &str, field: &str, key: &IndexKey) -> Vec<IndexKey> {
    if field == id_field {
        return if bucket.contains(key) {
            vec![key.clone()]
        } else {
            Vec::new()
        };
    }
    if let Some(tree) = bucket.indexes().tree(field) {
        return tree.lookup_eq(key);
    }
    bucket
        .iter_in_order()
        .filter(|(_, row)| field_matches(&row.body, field, key))
        .map(|(id, _)| id.clone())
        .collect()
}

fn decode_rows<'a, T, I>(rows: I) -> StoreResult<Vec<T>>
where
    T: DeserializeOwned,
    I: IntoIterator<Item = &'a RecordRow>,
{
    rows.into_iter().map(|row| decode_record(&row.body)).collect()
}

fn index_not_found(schema: &RecordSchema, field: &str) -> StoreError {
    StoreError::IndexNotFound {
        kind: schema.kind().to_string(),
        field: field.to_string(),
    }
}

fn require_field(field: &str) -> StoreResult<()> {
    if field.is_empty() {
        return Err(StoreError::NilParameter("field"));
    }
    Ok(())
}

fn require_bucket(bucket: &str) -> StoreResult<()> {
    if bucket.is_empty() {
        return Err(StoreError::NilParameter("bucket"));
    }
    Ok(())
}

fn encode_kv_key<K: Serialize + ?Sized>(key: &K) -> StoreResult<Vec<u8>> {
    let value = serde_json::to_value(key).map_err(|e| StoreError::BadType(e.to_string()))?;
    if value.is_null() {
        return Err(StoreError::NilParameter("key"));
    }
    serde_json::to_vec(&value).map_err(|e| StoreError::BadType(e.to_string()))
}
