//! Per-bucket index maintenance
//!
//! Indexes are derived state: they are built from the rows of a record
//! bucket when its schema is first registered, then updated in the same
//! critical section as every row change.
//!
//! # API
//!
//! - `rebuild(rows)` - Rebuild every index from current rows
//! - `check_unique(id, body)` - Detect unique collisions before a write
//! - `insert(id, body)` / `remove(id, body)` - Keep indexes in step with rows
//! - `tree(field)` - Access one index for lookups

use std::collections::HashMap;

use serde_json::Value;

use super::btree::{IndexKey, IndexTree};

/// A unique constraint that a write would break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueViolation {
    pub field: String,
    pub value: IndexKey,
}

#[derive(Debug, Clone)]
struct IndexedField {
    name: String,
    unique: bool,
}

/// All secondary indexes of one record bucket.
#[derive(Debug, Clone, Default)]
pub struct BucketIndexes {
    fields: Vec<IndexedField>,
    trees: HashMap<String, IndexTree>,
}

impl BucketIndexes {
    /// Creates empty indexes for `(field, unique)` pairs.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        let fields: Vec<IndexedField> = fields
            .into_iter()
            .map(|(name, unique)| IndexedField {
                name: name.into(),
                unique,
            })
            .collect();
        let trees = fields
            .iter()
            .map(|f| (f.name.clone(), IndexTree::new()))
            .collect();
        Self { fields, trees }
    }

    pub fn tree(&self, field: &str) -> Option<&IndexTree> {
        self.trees.get(field)
    }

    /// Checks every unique field of `body` against records other than `id`.
    pub fn check_unique(&self, id: &IndexKey, body: &Value) -> Result<(), UniqueViolation> {
        for field in self.fields.iter().filter(|f| f.unique) {
            let Some(key) = body.get(&field.name).and_then(IndexKey::from_json) else {
                continue;
            };
            let taken = self
                .trees
                .get(&field.name)
                .is_some_and(|t| t.held_by_other(&key, id).is_some());
            if taken {
                return Err(UniqueViolation {
                    field: field.name.clone(),
                    value: key,
                });
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, id: &IndexKey, body: &Value) {
        for field in &self.fields {
            if let Some(key) = body.get(&field.name).and_then(IndexKey::from_json) {
                if let Some(tree) = self.trees.get_mut(&field.name) {
                    tree.insert(key, id.clone());
                }
            }
        }
    }

    pub fn remove(&mut self, id: &IndexKey, body: &Value) {
        for field in &self.fields {
            if let Some(key) = body.get(&field.name).and_then(IndexKey::from_json) {
                if let Some(tree) = self.trees.get_mut(&field.name) {
                    tree.remove(&key, id);
                }
            }
        }
    }

    /// Rebuilds every index from `rows`.
    ///
    /// Fails if existing rows already violate a unique constraint, which means
    /// the data was written under a different schema.
    pub fn rebuild<'a, I>(&mut self, rows: I) -> Result<(), UniqueViolation>
    where
        I: IntoIterator<Item = (&'a IndexKey, &'a Value)>,
    {
        for tree in self.trees.values_mut() {
            tree.clear();
        }
        for (id, body) in rows {
            self.check_unique(id, body)?;
            self.insert(id, body);
        }
        Ok(())
    }
}
