//! Index subsystem for bucketdb
//!
//! Indexes are derived, in-memory-only state rebuilt from the log on connect.
//!
//! # Design Principles
//!
//! - Derived state: indexes mirror rows, never the source of truth
//! - Deterministic: BTreeMap iteration order, ids ascending within a value
//! - Updated under the same bucket lock as the row change they describe

mod btree;
mod manager;

pub use btree::{IndexKey, IndexTree};
pub use manager::{BucketIndexes, UniqueViolation};
