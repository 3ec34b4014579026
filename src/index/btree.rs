//! BTreeMap-based index structures
//!
//! An index maps a field value to the set of record identifiers holding it.
//! Both levels are ordered, so iteration is deterministic: by value, then by
//! identifier.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

const SIGN: u64 = 1 << 63;

/// Map an f64 onto a u64 whose unsigned order matches numeric order.
fn float_to_ordered(v: f64) -> u64 {
    let bits = v.to_bits();
    if bits & SIGN == 0 {
        bits | SIGN
    } else {
        !bits
    }
}

fn ordered_to_float(ordered: u64) -> f64 {
    if ordered & SIGN == 0 {
        f64::from_bits(!ordered)
    } else {
        f64::from_bits(ordered & !SIGN)
    }
}

/// A JSON scalar as it appears in an index. Variants compare in declaration
/// order, so booleans sort before numbers and numbers before strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    Bool(bool),
    /// i128 holds every i64 and u64
    Int(i128),
    Float(u64),
    String(String),
}

impl IndexKey {
    pub fn from_bool(v: bool) -> Self {
        IndexKey::Bool(v)
    }

    pub fn from_int(v: i128) -> Self {
        IndexKey::Int(v)
    }

    pub fn from_float(v: f64) -> Self {
        IndexKey::Float(float_to_ordered(v))
    }

    pub fn from_string(v: impl Into<String>) -> Self {
        IndexKey::String(v.into())
    }

    /// Null, arrays and objects have no key and are never indexed.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(IndexKey::from_bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(IndexKey::from_int(i as i128))
                } else if let Some(u) = n.as_u64() {
                    Some(IndexKey::from_int(u as i128))
                } else {
                    n.as_f64().map(IndexKey::from_float)
                }
            }
            serde_json::Value::String(s) => Some(IndexKey::from_string(s.as_str())),
            _ => None,
        }
    }

    /// Inverse of [`IndexKey::from_json`].
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            IndexKey::Bool(b) => serde_json::Value::Bool(*b),
            IndexKey::Int(i) => {
                if let Ok(v) = i64::try_from(*i) {
                    serde_json::Value::from(v)
                } else if let Ok(v) = u64::try_from(*i) {
                    serde_json::Value::from(v)
                } else {
                    serde_json::Value::Null
                }
            }
            IndexKey::Float(ordered) => serde_json::Number::from_f64(ordered_to_float(*ordered))
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            IndexKey::String(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Returns the string payload for string keys.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            IndexKey::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A single field index.
#[derive(Debug, Default, Clone)]
pub struct IndexTree {
    tree: BTreeMap<IndexKey, BTreeSet<IndexKey>>,
}

impl IndexTree {
    pub fn new() -> Self {
        Self {
            tree: BTreeMap::new(),
        }
    }

    /// Record that `id` holds `key`.
    pub fn insert(&mut self, key: IndexKey, id: IndexKey) {
        self.tree.entry(key).or_default().insert(id);
    }

    /// Forget that `id` holds `key`, dropping the key once no id holds it.
    pub fn remove(&mut self, key: &IndexKey, id: &IndexKey) {
        if let Some(ids) = self.tree.get_mut(key) {
            ids.remove(id);
            if ids.is_empty() {
                self.tree.remove(key);
            }
        }
    }

    /// All ids holding exactly `key`, ascending.
    pub fn lookup_eq(&self, key: &IndexKey) -> Vec<IndexKey> {
        self.tree
            .get(key)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether some id other than `id` holds `key`.
    pub fn held_by_other(&self, key: &IndexKey, id: &IndexKey) -> Option<&IndexKey> {
        self.tree
            .get(key)
            .and_then(|ids| ids.iter().find(|held| *held != id))
    }

    /// Every id in index order (value, then id).
    pub fn ordered_ids(&self) -> Vec<IndexKey> {
        self.tree.values().flat_map(|ids| ids.iter().cloned()).collect()
    }

    /// Ids whose string key starts with `prefix`, in index order.
    pub fn lookup_prefix(&self, prefix: &str) -> Vec<IndexKey> {
        let start = IndexKey::from_string(prefix);
        self.tree
            .range((Bound::Included(&start), Bound::Unbounded))
            .take_while(|(key, _)| key.as_str().is_some_and(|s| s.starts_with(prefix)))
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Returns the total number of (key, id) entries
    pub fn entry_count(&self) -> usize {
        self.tree.values().map(|ids| ids.len()).sum()
    }
}
