//! Record store
//!
//! Typed CRUD over record buckets with secondary and unique indexes, plus an
//! untyped key-value interface over named raw buckets.
//!
//! # Usage
//!
//! ```
//! use bucketdb::schema::RecordSchema;
//! use bucketdb::store::{Record, Store};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct User {
//!     id: u64,
//!     email: String,
//! }
//!
//! impl Record for User {
//!     fn schema() -> RecordSchema {
//!         RecordSchema::new("User").identifier("id").unique("email")
//!     }
//! }
//!
//! let dir = tempfile::TempDir::new().unwrap();
//! let store = Store::open(dir.path().join("app.db")).unwrap();
//! store.init::<User>().unwrap();
//! store.save(&User { id: 1, email: "a@x.com".into() }).unwrap();
//!
//! let user: User = store.one("email", "a@x.com").unwrap();
//! assert_eq!(user.id, 1);
//! store.close();
//! ```

mod bucket;
mod db;
mod engine;
mod errors;
mod record;

pub use db::Store;
pub use errors::{StoreError, StoreResult};
pub use record::Record;
