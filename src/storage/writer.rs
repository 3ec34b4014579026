//! Log writer with fsync enforcement
//!
//! - The file is exclusively locked for the writer's lifetime
//! - A frame is acknowledged only after write + fsync succeed
//! - A failed append is rolled back to the previous end of log so the next
//!   frame never lands after garbage; if the rollback itself fails the writer
//!   refuses every later append until the log is reopened or rewritten
//! - A torn tail found at open is truncated away before any new append

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::errors::{StorageError, StorageResult};
use super::reader::{Replay, StorageReader};
use super::record::LogFrame;

/// Append-only writer for the log file.
pub struct StorageWriter {
    storage_path: PathBuf,
    file: File,
    current_offset: u64,
    /// Set when a partial frame could not be rolled back
    failed: bool,
}

impl StorageWriter {
    /// Opens or creates the log at `storage_path`, locks it and replays it.
    ///
    /// Creates parent directories if needed. Returns the writer together with
    /// everything recovered from the existing log.
    ///
    /// # Errors
    ///
    /// - `BUCKETDB_STORAGE_LOCKED` if another handle holds the lock
    /// - `BUCKETDB_STORAGE_WRITE_FAILED` if the file cannot be created or opened
    /// - `BUCKETDB_DATA_CORRUPTION` if a frame before the tail fails verification
    pub fn open(storage_path: &Path) -> StorageResult<(Self, Replay)> {
        if let Some(parent) = storage_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    StorageError::write_failed(
                        format!("Failed to create directory: {}", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(storage_path)
            .map_err(|e| {
                StorageError::write_failed(
                    format!("Failed to open storage file: {}", storage_path.display()),
                    e,
                )
            })?;

        lock_exclusive(&file, storage_path)?;

        let scan_handle = file
            .try_clone()
            .map_err(|e| StorageError::io_error("Failed to clone storage handle", e))?;
        let replay = StorageReader::from_file(scan_handle)?.replay()?;

        if replay.torn_tail.is_some() {
            file.set_len(replay.valid_len).map_err(|e| {
                StorageError::write_failed("Failed to truncate torn tail", e)
            })?;
            file.sync_all()
                .map_err(|e| StorageError::write_failed("fsync failed after truncation", e))?;
        }

        let writer = Self {
            storage_path: storage_path.to_path_buf(),
            file,
            current_offset: replay.valid_len,
            failed: false,
        };
        Ok((writer, replay))
    }

    /// Returns the current end of log.
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// Appends one frame and fsyncs it.
    ///
    /// Returns the byte offset where the frame starts.
    pub fn append(&mut self, frame: &LogFrame) -> StorageResult<u64> {
        if self.failed {
            return Err(StorageError::writer_disabled(&self.storage_path));
        }
        let serialized = frame.serialize();
        let offset = self.current_offset;

        let result = self
            .file
            .write_all(&serialized)
            .map_err(|e| StorageError::write_failed("Failed to append frame", e))
            .and_then(|_| {
                self.file
                    .sync_data()
                    .map_err(|e| StorageError::write_failed("fsync failed after append", e))
            });

        if let Err(e) = result {
            if let Err(rollback) = self.file.set_len(offset) {
                self.failed = true;
                return Err(StorageError::write_failed(
                    format!("{}; rollback to byte {} also failed", e.message(), offset),
                    rollback,
                ));
            }
            return Err(e);
        }

        self.current_offset += serialized.len() as u64;
        Ok(offset)
    }

    /// Atomically replaces the log with `frames`.
    ///
    /// The new content is written to a sibling temp file, fsynced and locked,
    /// then renamed over the log. The writer continues on the new file.
    pub fn rewrite(&mut self, frames: &[LogFrame]) -> StorageResult<u64> {
        let tmp_path = self.storage_path.with_extension("compact");

        let mut tmp = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|e| {
                StorageError::write_failed(
                    format!("Failed to create {}", tmp_path.display()),
                    e,
                )
            })?;
        lock_exclusive(&tmp, &tmp_path)?;

        let mut written = 0u64;
        for frame in frames {
            let bytes = frame.serialize();
            tmp.write_all(&bytes)
                .map_err(|e| StorageError::write_failed("Failed to write compacted frame", e))?;
            written += bytes.len() as u64;
        }
        tmp.sync_all()
            .map_err(|e| StorageError::write_failed("fsync failed on compacted log", e))?;

        fs::rename(&tmp_path, &self.storage_path).map_err(|e| {
            StorageError::write_failed("Failed to replace log with compacted copy", e)
        })?;

        // `tmp` holds the lock on the renamed inode until the append handle exists.
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.storage_path)
            .map_err(|e| StorageError::write_failed("Failed to reopen compacted log", e))?;
        drop(tmp);
        lock_exclusive(&file, &self.storage_path)?;

        self.file = file;
        self.current_offset = written;
        self.failed = false;
        Ok(written)
    }
}

fn lock_exclusive(file: &File, path: &Path) -> StorageResult<()> {
    match file.try_lock() {
        Ok(()) => Ok(()),
        Err(TryLockError::WouldBlock) => Err(StorageError::locked(path)),
        Err(TryLockError::Error(e)) => Err(StorageError::io_error(
            format!("Failed to lock {}", path.display()),
            e,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::errors::StorageErrorCode;
    use crate::storage::record::{LogOp, Namespace};
    use tempfile::TempDir;

    fn frame(key: &str) -> LogFrame {
        LogFrame::single(LogOp::put(
            Namespace::Records,
            "User",
            key.as_bytes().to_vec(),
            b"{}".to_vec(),
        ))
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("app.db");

        let (writer, replay) = StorageWriter::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(writer.current_offset(), 0);
        assert!(replay.frames.is_empty());
    }

    #[test]
    fn test_append_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.db");

        {
            let (mut writer, _) = StorageWriter::open(&path).unwrap();
            assert_eq!(writer.append(&frame("1")).unwrap(), 0);
            let second = writer.append(&frame("2")).unwrap();
            assert!(second > 0);
        }

        let (writer, replay) = StorageWriter::open(&path).unwrap();
        assert_eq!(replay.frames, vec![frame("1"), frame("2")]);
        assert_eq!(writer.current_offset(), std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn test_second_open_is_locked() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.db");

        let (_writer, _) = StorageWriter::open(&path).unwrap();
        let err = StorageWriter::open(&path).err().unwrap();
        assert_eq!(err.code(), StorageErrorCode::Locked);
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.db");

        drop(StorageWriter::open(&path).unwrap());
        assert!(StorageWriter::open(&path).is_ok());
    }

    #[test]
    fn test_torn_tail_truncated_then_appendable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.db");

        {
            let (mut writer, _) = StorageWriter::open(&path).unwrap();
            writer.append(&frame("1")).unwrap();
        }
        let good_len = std::fs::metadata(&path).unwrap().len();
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&frame("2").serialize()[..7]).unwrap();
        }

        {
            let (mut writer, replay) = StorageWriter::open(&path).unwrap();
            assert!(replay.torn_tail.is_some());
            assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);
            writer.append(&frame("3")).unwrap();
        }

        let (_, replay) = StorageWriter::open(&path).unwrap();
        assert_eq!(replay.frames, vec![frame("1"), frame("3")]);
        assert!(replay.torn_tail.is_none());
    }

    #[test]
    fn test_rewrite_replaces_content_and_keeps_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.db");

        let (mut writer, _) = StorageWriter::open(&path).unwrap();
        for key in ["1", "2", "3"] {
            writer.append(&frame(key)).unwrap();
        }

        let len = writer.rewrite(&[frame("3")]).unwrap();
        assert_eq!(len, frame("3").serialize().len() as u64);
        assert!(StorageWriter::open(&path).is_err());

        writer.append(&frame("4")).unwrap();
        drop(writer);

        let (_, replay) = StorageWriter::open(&path).unwrap();
        assert_eq!(replay.frames, vec![frame("3"), frame("4")]);
        assert!(!path.with_extension("compact").exists());
    }

    #[test]
    fn test_failed_rollback_disables_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.db");
        {
            let (mut writer, _) = StorageWriter::open(&path).unwrap();
            writer.append(&frame("1")).unwrap();
        }
        let good_len = std::fs::metadata(&path).unwrap().len();

        // A read-only handle fails both the append and the truncate.
        let mut writer = StorageWriter {
            storage_path: path.clone(),
            file: File::open(&path).unwrap(),
            current_offset: good_len,
            failed: false,
        };

        let err = writer.append(&frame("2")).unwrap_err();
        assert_eq!(err.code(), StorageErrorCode::WriteFailed);
        assert!(err.message().contains("rollback"));
        assert!(writer.failed);

        let err = writer.append(&frame("3")).unwrap_err();
        assert_eq!(err.code(), StorageErrorCode::WriteFailed);
        assert!(err.message().contains("disabled"));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);
    }

    #[test]
    fn test_rewrite_reenables_failed_writer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.db");

        let (mut writer, _) = StorageWriter::open(&path).unwrap();
        writer.append(&frame("1")).unwrap();
        writer.failed = true;
        assert!(writer.append(&frame("2")).is_err());

        writer.rewrite(&[frame("1")]).unwrap();
        writer.append(&frame("2")).unwrap();
        drop(writer);

        let (_, replay) = StorageWriter::open(&path).unwrap();
        assert_eq!(replay.frames, vec![frame("1"), frame("2")]);
    }
}
