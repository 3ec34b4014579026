//! Connected store internals
//!
//! Lock order, outermost first:
//! 1. bucket map (`records` before `kv`)
//! 2. a single bucket
//! 3. the log writer
//!
//! A mutation holds its bucket's write lock across the log append and the
//! in-memory apply, so readers of that bucket never see the row without its
//! index entries and readers of other buckets are never blocked.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use super::bucket::{KvBucket, RecordBucket};
use super::errors::{StoreError, StoreResult};
use super::record::decode_id;
use crate::observability::Event;
use crate::schema::{self, RecordSchema, SchemaError};
use crate::storage::{
    LogFrame, LogOp, Namespace, OpKind, StorageError, StorageResult, StorageWriter,
};

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn mutex_lock<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

type Shared<T> = Arc<RwLock<T>>;

/// Replay summary reported at connect.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConnectStats {
    pub frames: usize,
    pub record_buckets: usize,
    pub kv_buckets: usize,
    pub torn_tail: Option<String>,
}

pub(crate) struct Engine {
    writer: Mutex<StorageWriter>,
    records: RwLock<HashMap<String, Shared<RecordBucket>>>,
    kv: RwLock<HashMap<String, Shared<KvBucket>>>,
    schemas: RwLock<HashMap<String, Arc<RecordSchema>>>,
}

impl Engine {
    /// Opens the log, replays it and builds in-memory buckets.
    pub fn open(location: &Path) -> StorageResult<(Self, ConnectStats)> {
        let (writer, replay) = StorageWriter::open(location)?;

        let mut records: HashMap<String, RecordBucket> = HashMap::new();
        let mut kv: HashMap<String, KvBucket> = HashMap::new();
        for frame in &replay.frames {
            for op in &frame.ops {
                apply_replayed(&mut records, &mut kv, op)?;
            }
        }

        let stats = ConnectStats {
            frames: replay.frames.len(),
            record_buckets: records.len(),
            kv_buckets: kv.len(),
            torn_tail: replay.torn_tail,
        };

        let engine = Self {
            writer: Mutex::new(writer),
            records: RwLock::new(
                records
                    .into_iter()
                    .map(|(name, b)| (name, Arc::new(RwLock::new(b))))
                    .collect(),
            ),
            kv: RwLock::new(
                kv.into_iter()
                    .map(|(name, b)| (name, Arc::new(RwLock::new(b))))
                    .collect(),
            ),
            schemas: RwLock::new(HashMap::new()),
        };
        Ok((engine, stats))
    }

    /// Appends a frame; the caller applies it in memory only on success.
    pub fn commit(&self, frame: &LogFrame) -> StoreResult<()> {
        if frame.is_empty() {
            return Ok(());
        }
        mutex_lock(&self.writer).append(frame)?;
        Ok(())
    }

    /// Returns the cached schema for the kind `declared` names, registering it
    /// on first use.
    pub fn schema(&self, declared: RecordSchema) -> StoreResult<Arc<RecordSchema>> {
        if let Some(cached) = read_lock(&self.schemas).get(declared.kind()) {
            return check_same(cached, &declared);
        }

        schema::validate(&declared)?;
        let mut schemas = write_lock(&self.schemas);
        match schemas.entry(declared.kind().to_string()) {
            Entry::Occupied(e) => check_same(e.get(), &declared),
            Entry::Vacant(e) => Ok(Arc::clone(e.insert(Arc::new(declared)))),
        }
    }

    fn record_bucket(&self, kind: &str) -> Shared<RecordBucket> {
        if let Some(bucket) = read_lock(&self.records).get(kind) {
            return Arc::clone(bucket);
        }
        Arc::clone(write_lock(&self.records).entry(kind.to_string()).or_default())
    }

    fn kv_bucket(&self, name: &str) -> Shared<KvBucket> {
        if let Some(bucket) = read_lock(&self.kv).get(name) {
            return Arc::clone(bucket);
        }
        Arc::clone(write_lock(&self.kv).entry(name.to_string()).or_default())
    }

    /// Runs `f` on the kind's bucket under a read lock, indexes built.
    pub fn with_records<R>(
        &self,
        schema: &Arc<RecordSchema>,
        f: impl FnOnce(&RecordBucket) -> StoreResult<R>,
    ) -> StoreResult<R> {
        loop {
            let bucket = self.record_bucket(schema.kind());
            {
                let guard = read_lock(&bucket);
                if !guard.dropped && guard.is_indexed_for(schema) {
                    return f(&guard);
                }
            }
            let mut guard = write_lock(&bucket);
            if !guard.dropped {
                guard.ensure_indexes(schema)?;
            }
        }
    }

    /// Runs `f` on the kind's bucket under a write lock, indexes built.
    pub fn with_records_mut<R>(
        &self,
        schema: &Arc<RecordSchema>,
        f: impl FnOnce(&mut RecordBucket) -> StoreResult<R>,
    ) -> StoreResult<R> {
        loop {
            let bucket = self.record_bucket(schema.kind());
            let mut guard = write_lock(&bucket);
            if guard.dropped {
                continue;
            }
            guard.ensure_indexes(schema)?;
            return f(&mut guard);
        }
    }

    /// Runs `f` on an existing key-value bucket, or returns `None` if there is none.
    pub fn with_kv<R>(&self, name: &str, f: impl FnOnce(&KvBucket) -> R) -> Option<R> {
        let bucket = read_lock(&self.kv).get(name).map(Arc::clone)?;
        let guard = read_lock(&bucket);
        Some(f(&guard))
    }

    pub fn with_kv_mut<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut KvBucket) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let bucket = self.kv_bucket(name);
        let mut guard = write_lock(&bucket);
        f(&mut guard)
    }

    /// Removes a record bucket and its indexes. Absent buckets are a no-op.
    pub fn drop_records(&self, kind: &str) -> StoreResult<()> {
        let mut records = write_lock(&self.records);
        let Some(bucket) = records.get(kind).map(Arc::clone) else {
            return Ok(());
        };
        let mut guard = write_lock(&bucket);
        self.commit(&LogFrame::single(LogOp::drop_bucket(Namespace::Records, kind)))?;
        let rows = guard.len().to_string();
        guard.mark_dropped();
        records.remove(kind);
        Event::StoreBucketDropped.emit(&[("kind", kind), ("rows", &rows)]);
        Ok(())
    }

    /// Rewrites the log to hold one put per live row.
    ///
    /// Returns `(bytes_before, bytes_after)`.
    pub fn compact(&self) -> StoreResult<(u64, u64)> {
        let records = read_lock(&self.records);
        let kv = read_lock(&self.kv);

        let mut record_buckets: Vec<(&String, &Shared<RecordBucket>)> = records.iter().collect();
        record_buckets.sort_by(|a, b| a.0.cmp(b.0));
        let mut kv_buckets: Vec<(&String, &Shared<KvBucket>)> = kv.iter().collect();
        kv_buckets.sort_by(|a, b| a.0.cmp(b.0));

        let record_guards: Vec<_> = record_buckets
            .iter()
            .map(|(name, b)| (name.as_str(), read_lock(b)))
            .collect();
        let kv_guards: Vec<_> = kv_buckets
            .iter()
            .map(|(name, b)| (name.as_str(), read_lock(b)))
            .collect();

        let mut frames = Vec::new();
        for (kind, bucket) in &record_guards {
            let mut ops = Vec::with_capacity(bucket.len());
            for (id, row) in bucket.iter_in_order() {
                let key = super::record::encode_id(id)?;
                let value = serde_json::to_vec(&row.body)
                    .map_err(|e| StoreError::BadType(e.to_string()))?;
                ops.push(LogOp::put(Namespace::Records, *kind, key, value));
            }
            if !ops.is_empty() {
                frames.push(LogFrame::new(ops));
            }
        }
        for (name, bucket) in &kv_guards {
            let ops: Vec<LogOp> = bucket
                .entries
                .iter()
                .map(|(k, v)| LogOp::put(Namespace::KeyValue, *name, k.clone(), v.clone()))
                .collect();
            if !ops.is_empty() {
                frames.push(LogFrame::new(ops));
            }
        }

        let mut writer = mutex_lock(&self.writer);
        let before = writer.current_offset();
        let after = writer.rewrite(&frames)?;
        Ok((before, after))
    }

    pub fn log_size(&self) -> u64 {
        mutex_lock(&self.writer).current_offset()
    }
}

fn check_same(cached: &Arc<RecordSchema>, declared: &RecordSchema) -> StoreResult<Arc<RecordSchema>> {
    if **cached == *declared {
        Ok(Arc::clone(cached))
    } else {
        Err(SchemaError::Conflict(declared.kind().to_string()).into())
    }
}

fn apply_replayed(
    records: &mut HashMap<String, RecordBucket>,
    kv: &mut HashMap<String, KvBucket>,
    op: &LogOp,
) -> StorageResult<()> {
    match (op.namespace, op.kind) {
        (Namespace::Records, OpKind::Put) => {
            let id = decode_id(&op.key).ok_or_else(|| {
                StorageError::data_corruption(format!("undecodable record key in {}", op.bucket))
            })?;
            let body: Value = serde_json::from_slice(&op.value).map_err(|e| {
                StorageError::data_corruption(format!("undecodable record in {}: {}", op.bucket, e))
            })?;
            records.entry(op.bucket.clone()).or_default().put(id, body);
        }
        (Namespace::Records, OpKind::Delete) => {
            if let (Some(bucket), Some(id)) = (records.get_mut(&op.bucket), decode_id(&op.key)) {
                bucket.remove(&id);
            }
        }
        (Namespace::Records, OpKind::DropBucket) => {
            records.remove(&op.bucket);
        }
        (Namespace::KeyValue, OpKind::Put) => {
            kv.entry(op.bucket.clone())
                .or_default()
                .entries
                .insert(op.key.clone(), op.value.clone());
        }
        (Namespace::KeyValue, OpKind::Delete) => {
            if let Some(bucket) = kv.get_mut(&op.bucket) {
                bucket.entries.remove(&op.key);
            }
        }
        (Namespace::KeyValue, OpKind::DropBucket) => {
            kv.remove(&op.bucket);
        }
    }
    Ok(())
}
