//! Storage subsystem for bucketdb
//!
//! The storage engine is a single append-only log file. Every committed
//! mutation is one checksummed frame; in-memory state (rows and indexes) is
//! derived from replaying the log at connect time.
//!
//! # Design Principles
//!
//! - Append-only, fsync before acknowledge
//! - Checksum-verified on every read
//! - One frame per operation: replay applies a frame entirely or not at all
//! - Interrupted final append is truncated, corruption elsewhere refuses to open
//! - Exclusive file lock for the lifetime of the writer

mod checksum;
mod errors;
mod reader;
mod record;
mod writer;

pub use checksum::{compute_checksum, verify_checksum};
pub use errors::{StorageError, StorageErrorCode, StorageResult};
pub use reader::{ReadOutcome, Replay, StorageReader};
pub use record::{LogFrame, LogOp, Namespace, OpKind, MIN_FRAME_SIZE};
pub use writer::StorageWriter;
