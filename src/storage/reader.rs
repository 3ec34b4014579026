//! Log reader with corruption and torn-write detection
//!
//! - Every frame header and frame is checksum-verified before it is used
//! - A final frame that is cut short, or whose body fails verification at the
//!   end of the file, is a torn write from an interrupted append; the reader
//!   reports it instead of failing
//! - A frame header that fails verification is corruption, wherever it is,
//!   so a damaged length never causes valid frames to be discarded

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

use super::errors::{StorageError, StorageResult};
use super::record::{FrameHeader, LogFrame, HEADER_SIZE};

/// Outcome of reading one frame.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A verified frame
    Frame(LogFrame),
    /// Clean end of log
    End,
    /// The remaining bytes are an interrupted final append
    TornTail(String),
}

/// Everything recovered from a full scan.
#[derive(Debug, Default)]
pub struct Replay {
    pub frames: Vec<LogFrame>,
    /// Byte length of the verified prefix
    pub valid_len: u64,
    /// Reason the tail was discarded, if it was
    pub torn_tail: Option<String>,
}

/// Sequential reader over the log file.
pub struct StorageReader {
    reader: BufReader<File>,
    current_offset: u64,
    file_size: u64,
}

impl StorageReader {
    /// Reads through an already-open handle, starting at offset zero.
    pub fn from_file(mut file: File) -> StorageResult<Self> {
        let file_size = file
            .metadata()
            .map_err(|e| StorageError::read_failed("Failed to read file metadata", e))?
            .len();
        file.seek(SeekFrom::Start(0))
            .map_err(|e| StorageError::read_failed("Failed to seek to start of log", e))?;

        Ok(Self {
            reader: BufReader::new(file),
            current_offset: 0,
            file_size,
        })
    }

    /// Reads the next frame.
    pub fn read_next(&mut self) -> StorageResult<ReadOutcome> {
        if self.current_offset >= self.file_size {
            return Ok(ReadOutcome::End);
        }

        let remaining = self.file_size - self.current_offset;
        if remaining < HEADER_SIZE as u64 {
            return Ok(ReadOutcome::TornTail(format!(
                "{} trailing bytes, shorter than a frame header",
                remaining
            )));
        }

        let mut header_buf = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header_buf).map_err(|e| {
            StorageError::corruption_at_offset(
                self.current_offset,
                format!("Failed to read frame header: {}", e),
            )
        })?;
        let header = FrameHeader::decode(&header_buf)
            .map_err(|e| StorageError::corruption_at_offset(self.current_offset, e.to_string()))?;
        let frame_length = header.frame_length as u64;

        // The header verified, so the bytes past end of file were never written.
        if frame_length > remaining {
            return Ok(ReadOutcome::TornTail(format!(
                "frame length {} exceeds remaining {} bytes",
                frame_length, remaining
            )));
        }

        let mut frame_buf = vec![0u8; frame_length as usize];
        frame_buf[..HEADER_SIZE].copy_from_slice(&header_buf);
        self.reader.read_exact(&mut frame_buf[HEADER_SIZE..]).map_err(|e| {
            StorageError::corruption_at_offset(
                self.current_offset,
                format!("Failed to read frame body: {}", e),
            )
        })?;

        match LogFrame::deserialize(&frame_buf) {
            Ok((frame, consumed)) => {
                self.current_offset += consumed as u64;
                Ok(ReadOutcome::Frame(frame))
            }
            Err(e) if self.current_offset + frame_length == self.file_size => {
                Ok(ReadOutcome::TornTail(e.to_string()))
            }
            Err(e) => Err(StorageError::corruption_at_offset(self.current_offset, e.to_string())),
        }
    }

    /// Reads every verified frame, stopping at a torn tail.
    pub fn replay(&mut self) -> StorageResult<Replay> {
        let mut replay = Replay::default();
        loop {
            match self.read_next()? {
                ReadOutcome::Frame(frame) => replay.frames.push(frame),
                ReadOutcome::End => break,
                ReadOutcome::TornTail(reason) => {
                    replay.torn_tail = Some(reason);
                    break;
                }
            }
        }
        replay.valid_len = self.current_offset;
        Ok(replay)
    }
}
