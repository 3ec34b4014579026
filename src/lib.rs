//! bucketdb - an embedded record store with secondary indexes
//!
//! A single-file, append-only store for typed records keyed by a declared
//! identifier field, with equality, unique and prefix indexes, plus an
//! untyped key-value interface over named buckets. `http_server` hosts a
//! store behind an HTTP listener.

pub mod cli;
pub mod http_server;
pub mod index;
pub mod observability;
pub mod schema;
pub mod storage;
pub mod store;
