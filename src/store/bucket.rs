//! In-memory bucket state
//!
//! Buckets hold the materialized result of replaying the log. A record
//! bucket keeps its rows, their insertion order and its secondary indexes;
//! a key-value bucket is a plain ordered map of encoded keys to encoded
//! values.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;

use crate::index::{BucketIndexes, IndexKey};
use crate::schema::{RecordSchema, SchemaError};

/// One stored record.
#[derive(Debug, Clone)]
pub(crate) struct RecordRow {
    /// Position in insertion order; kept across updates
    pub seq: u64,
    pub body: Value,
}

#[derive(Debug, Default)]
pub(crate) struct RecordBucket {
    rows: HashMap<IndexKey, RecordRow>,
    order: BTreeMap<u64, IndexKey>,
    next_seq: u64,
    indexes: BucketIndexes,
    indexed_for: Option<Arc<RecordSchema>>,
    /// Set once the bucket has been removed by a drop; holders must re-fetch
    pub dropped: bool,
}

impl RecordBucket {
    pub fn get(&self, id: &IndexKey) -> Option<&RecordRow> {
        self.rows.get(id)
    }

    pub fn contains(&self, id: &IndexKey) -> bool {
        self.rows.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn indexes(&self) -> &BucketIndexes {
        &self.indexes
    }

    /// Whether indexes are current for `schema`.
    pub fn is_indexed_for(&self, schema: &Arc<RecordSchema>) -> bool {
        self.indexed_for
            .as_ref()
            .is_some_and(|s| Arc::ptr_eq(s, schema))
    }

    /// Builds indexes for `schema` from the current rows, unless already done.
    pub fn ensure_indexes(&mut self, schema: &Arc<RecordSchema>) -> Result<(), SchemaError> {
        if self.is_indexed_for(schema) {
            return Ok(());
        }
        let mut indexes = BucketIndexes::new(schema.indexed_fields());
        indexes
            .rebuild(self.rows.iter().map(|(id, row)| (id, &row.body)))
            .map_err(|v| SchemaError::StoredDataViolation {
                kind: schema.kind().to_string(),
                field: v.field,
            })?;
        self.indexes = indexes;
        self.indexed_for = Some(Arc::clone(schema));
        Ok(())
    }

    /// Inserts or replaces a row, keeping its position when replacing.
    pub fn put(&mut self, id: IndexKey, body: Value) {
        match self.rows.get_mut(&id) {
            Some(row) => {
                self.indexes.remove(&id, &row.body);
                self.indexes.insert(&id, &body);
                row.body = body;
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.indexes.insert(&id, &body);
                self.order.insert(seq, id.clone());
                self.rows.insert(id, RecordRow { seq, body });
            }
        }
    }

    pub fn remove(&mut self, id: &IndexKey) -> Option<RecordRow> {
        let row = self.rows.remove(id)?;
        self.order.remove(&row.seq);
        self.indexes.remove(id, &row.body);
        Some(row)
    }

    /// Rows in insertion order.
    pub fn iter_in_order(&self) -> impl Iterator<Item = (&IndexKey, &RecordRow)> {
        self.order
            .values()
            .filter_map(|id| self.rows.get(id).map(|row| (id, row)))
    }

    /// Rows for `ids`, sorted into insertion order.
    pub fn rows_by_insertion(&self, ids: &[IndexKey]) -> Vec<&RecordRow> {
        let mut rows: Vec<&RecordRow> = ids.iter().filter_map(|id| self.rows.get(id)).collect();
        rows.sort_by_key(|row| row.seq);
        rows
    }

    /// Rows ordered by identifier.
    pub fn rows_by_id(&self) -> Vec<&RecordRow> {
        let mut ids: Vec<&IndexKey> = self.rows.keys().collect();
        ids.sort();
        ids.into_iter().filter_map(|id| self.rows.get(id)).collect()
    }

    /// Marks the bucket as removed and releases its contents.
    pub fn mark_dropped(&mut self) {
        self.dropped = true;
        self.rows.clear();
        self.order.clear();
        self.indexes = BucketIndexes::default();
        self.indexed_for = None;
    }
}

#[derive(Debug, Default)]
pub(crate) struct KvBucket {
    pub entries: BTreeMap<Vec<u8>, Vec<u8>>,
}
