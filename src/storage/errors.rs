//! Storage error types
//!
//! Every error carries a stable code:
//! - BUCKETDB_STORAGE_IO_ERROR
//! - BUCKETDB_STORAGE_WRITE_FAILED
//! - BUCKETDB_STORAGE_READ_FAILED
//! - BUCKETDB_STORAGE_LOCKED
//! - BUCKETDB_DATA_CORRUPTION (fatal: the log must not be opened)

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    IoError,
    /// Frame append, fsync or rewrite failed
    WriteFailed,
    ReadFailed,
    /// Another handle holds the exclusive lock on the file
    Locked,
    /// Checksum or framing failure before the tail of the log
    DataCorruption,
}

impl StorageErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            StorageErrorCode::IoError => "BUCKETDB_STORAGE_IO_ERROR",
            StorageErrorCode::WriteFailed => "BUCKETDB_STORAGE_WRITE_FAILED",
            StorageErrorCode::ReadFailed => "BUCKETDB_STORAGE_READ_FAILED",
            StorageErrorCode::Locked => "BUCKETDB_STORAGE_LOCKED",
            StorageErrorCode::DataCorruption => "BUCKETDB_DATA_CORRUPTION",
        }
    }
}

impl fmt::Display for StorageErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Storage failure with its code, the file or byte position involved, and
/// the underlying I/O error when there is one.
#[derive(Debug)]
pub struct StorageError {
    code: StorageErrorCode,
    message: String,
    path: Option<PathBuf>,
    offset: Option<u64>,
    source: Option<io::Error>,
}

impl StorageError {
    fn new(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
            offset: None,
            source: None,
        }
    }

    fn caused_by(mut self, source: io::Error) -> Self {
        self.source = Some(source);
        self
    }

    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(StorageErrorCode::IoError, message).caused_by(source)
    }

    pub fn write_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(StorageErrorCode::WriteFailed, message).caused_by(source)
    }

    pub fn read_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(StorageErrorCode::ReadFailed, message).caused_by(source)
    }

    /// The file at `path` is locked by another handle
    pub fn locked(path: &Path) -> Self {
        let mut err = Self::new(StorageErrorCode::Locked, "storage file is locked by another handle");
        err.path = Some(path.to_path_buf());
        err
    }

    /// A partial frame could not be rolled back; appends stay refused until
    /// the log is reopened
    pub fn writer_disabled(path: &Path) -> Self {
        let mut err = Self::new(
            StorageErrorCode::WriteFailed,
            "writer disabled after a failed rollback, reopen the store",
        );
        err.path = Some(path.to_path_buf());
        err
    }

    /// Replayed data that decodes at the frame level but not as a store mutation
    pub fn data_corruption(message: impl Into<String>) -> Self {
        Self::new(StorageErrorCode::DataCorruption, message)
    }

    /// A bad frame starting at `offset`
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        let mut err = Self::new(StorageErrorCode::DataCorruption, reason);
        err.offset = Some(offset);
        err
    }

    pub fn code(&self) -> StorageErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Byte offset of the frame that failed to verify
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// Whether the log cannot be trusted
    pub fn is_fatal(&self) -> bool {
        self.code == StorageErrorCode::DataCorruption
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(path) = &self.path {
            write!(f, " [{}]", path.display())?;
        }
        if let Some(offset) = self.offset {
            write!(f, " at byte {}", offset)?;
        }
        if let Some(source) = &self.source {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
