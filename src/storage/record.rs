//! Log frame format
//!
//! Every committed mutation is one frame:
//!
//! ```text
//! +------------------+
//! | Frame Length     | (u32 LE, whole frame including this field)
//! +------------------+
//! | Op Count         | (u32 LE)
//! +------------------+
//! | Header Checksum  | (u32 LE, CRC32 of length + op count)
//! +------------------+
//! | Ops...           |
//! +------------------+
//! | Checksum         | (u32 LE)
//! +------------------+
//! ```
//!
//! Each op:
//!
//! ```text
//! | Kind (u8) | Namespace (u8) | Bucket (len-prefixed str) | Key (len-prefixed) | Value (len-prefixed) |
//! ```
//!
//! The trailing checksum covers all bytes except itself. The header checksum
//! lets a reader trust the length of a frame whose body never reached disk.

use std::io::{self, Cursor, Read};

use super::checksum::{compute_checksum, verify_checksum};

/// Length + op count + header checksum.
pub const HEADER_SIZE: usize = 4 + 4 + 4;

/// Smallest well-formed frame: header + checksum.
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + 4;

/// The verified fixed-size prefix of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_length: u32,
    pub op_count: u32,
}

impl FrameHeader {
    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.frame_length.to_le_bytes());
        out[4..8].copy_from_slice(&self.op_count.to_le_bytes());
        let crc = compute_checksum(&out[..8]);
        out[8..12].copy_from_slice(&crc.to_le_bytes());
        out
    }

    /// Parses the header at the front of `data` and verifies its checksum.
    pub fn decode(data: &[u8]) -> io::Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Frame header truncated"));
        }
        if !verify_checksum(&data[..8], le_u32(data, 8)) {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "Header checksum mismatch"));
        }
        let header = Self {
            frame_length: le_u32(data, 0),
            op_count: le_u32(data, 4),
        };
        if (header.frame_length as usize) < MIN_FRAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid frame length: {}", header.frame_length),
            ));
        }
        Ok(header)
    }
}

/// What an op does to its bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Insert or replace `key`
    Put,
    /// Remove `key`
    Delete,
    /// Remove the whole bucket
    DropBucket,
}

impl OpKind {
    fn tag(self) -> u8 {
        match self {
            OpKind::Put => 1,
            OpKind::Delete => 2,
            OpKind::DropBucket => 3,
        }
    }

    fn from_tag(tag: u8) -> io::Result<Self> {
        match tag {
            1 => Ok(OpKind::Put),
            2 => Ok(OpKind::Delete),
            3 => Ok(OpKind::DropBucket),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unknown op kind: {}", other),
            )),
        }
    }
}

/// Record buckets and raw key-value buckets never share a name space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Typed records keyed by identifier
    Records,
    /// Untyped key-value pairs
    KeyValue,
}

impl Namespace {
    fn tag(self) -> u8 {
        match self {
            Namespace::Records => 0,
            Namespace::KeyValue => 1,
        }
    }

    fn from_tag(tag: u8) -> io::Result<Self> {
        match tag {
            0 => Ok(Namespace::Records),
            1 => Ok(Namespace::KeyValue),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unknown namespace: {}", other),
            )),
        }
    }
}

/// A single bucket mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOp {
    pub kind: OpKind,
    pub namespace: Namespace,
    pub bucket: String,
    pub key: Vec<u8>,
    /// Empty for deletes and drops
    pub value: Vec<u8>,
}

impl LogOp {
    pub fn put(namespace: Namespace, bucket: impl Into<String>, key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            kind: OpKind::Put,
            namespace,
            bucket: bucket.into(),
            key,
            value,
        }
    }

    pub fn delete(namespace: Namespace, bucket: impl Into<String>, key: Vec<u8>) -> Self {
        Self {
            kind: OpKind::Delete,
            namespace,
            bucket: bucket.into(),
            key,
            value: Vec::new(),
        }
    }

    pub fn drop_bucket(namespace: Namespace, bucket: impl Into<String>) -> Self {
        Self {
            kind: OpKind::DropBucket,
            namespace,
            bucket: bucket.into(),
            key: Vec::new(),
            value: Vec::new(),
        }
    }
}

/// One atomic unit in the log. Replay applies all of its ops or none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFrame {
    pub ops: Vec<LogOp>,
}

impl LogFrame {
    pub fn new(ops: Vec<LogOp>) -> Self {
        Self { ops }
    }

    pub fn single(op: LogOp) -> Self {
        Self { ops: vec![op] }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Serialize the complete frame, checksums included.
    pub fn serialize(&self) -> Vec<u8> {
        let mut ops = Vec::new();
        for op in &self.ops {
            ops.push(op.kind.tag());
            ops.push(op.namespace.tag());
            write_bytes(&mut ops, op.bucket.as_bytes());
            write_bytes(&mut ops, &op.key);
            write_bytes(&mut ops, &op.value);
        }

        let header = FrameHeader {
            frame_length: (HEADER_SIZE + ops.len() + 4) as u32,
            op_count: self.ops.len() as u32,
        };

        let mut frame = Vec::with_capacity(header.frame_length as usize);
        frame.extend_from_slice(&header.encode());
        frame.extend_from_slice(&ops);
        let checksum = compute_checksum(&frame);
        frame.extend_from_slice(&checksum.to_le_bytes());

        frame
    }

    /// Deserialize one frame from the front of `data`, verifying both checksums.
    ///
    /// Returns the frame and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        let header = FrameHeader::decode(data)?;
        let frame_length = header.frame_length as usize;
        if data.len() < frame_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Frame truncated: expected {} bytes, got {}",
                    frame_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = frame_length - 4;
        let stored_checksum = le_u32(data, checksum_offset);
        if !verify_checksum(&data[..checksum_offset], stored_checksum) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Checksum mismatch: computed {:08x}, stored {:08x}",
                    compute_checksum(&data[..checksum_offset]),
                    stored_checksum
                ),
            ));
        }

        let mut cursor = Cursor::new(&data[HEADER_SIZE..checksum_offset]);
        let mut ops = Vec::with_capacity((header.op_count as usize).min(1024));
        for _ in 0..header.op_count {
            let mut tags = [0u8; 2];
            cursor.read_exact(&mut tags)?;
            let kind = OpKind::from_tag(tags[0])?;
            let namespace = Namespace::from_tag(tags[1])?;
            let bucket = String::from_utf8(read_bytes(&mut cursor)?).map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, format!("Invalid UTF-8: {}", e))
            })?;
            let key = read_bytes(&mut cursor)?;
            let value = read_bytes(&mut cursor)?;
            ops.push(LogOp {
                kind,
                namespace,
                bucket,
                key,
                value,
            });
        }

        if cursor.position() as usize != checksum_offset - HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Trailing bytes after last op",
            ));
        }

        Ok((Self { ops }, frame_length))
    }
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn le_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    Ok(u32::from_le_bytes(len_buf))
}

fn read_bytes<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = read_u32(reader)? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> LogFrame {
        LogFrame::new(vec![
            LogOp::put(
                Namespace::Records,
                "User",
                b"1".to_vec(),
                br#"{"id":1,"email":"a@x.com"}"#.to_vec(),
            ),
            LogOp::delete(Namespace::KeyValue, "settings", br#""theme""#.to_vec()),
            LogOp::drop_bucket(Namespace::Records, "Session"),
        ])
    }

    #[test]
    fn test_frame_roundtrip() {
        let frame = sample_frame();
        let serialized = frame.serialize();
        let (decoded, consumed) = LogFrame::deserialize(&serialized).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(consumed, serialized.len());
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut serialized = sample_frame().serialize();
        let mid = serialized.len() / 2;
        serialized[mid] ^= 0xFF;

        let err = LogFrame::deserialize(&serialized).unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn test_header_checksum_guards_length() {
        let mut serialized = sample_frame().serialize();
        serialized[1] ^= 0x01;

        let err = LogFrame::deserialize(&serialized).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("Header checksum mismatch"));
    }

    #[test]
    fn test_header_decodes_without_body() {
        let serialized = sample_frame().serialize();
        let header = FrameHeader::decode(&serialized[..HEADER_SIZE]).unwrap();
        assert_eq!(header.frame_length as usize, serialized.len());
        assert_eq!(header.op_count, 3);
    }

    #[test]
    fn test_truncated_frame_is_eof() {
        let serialized = sample_frame().serialize();
        let err = LogFrame::deserialize(&serialized[..serialized.len() - 3]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_deserialize_reads_only_first_frame() {
        let first = LogFrame::single(LogOp::put(Namespace::KeyValue, "a", b"1".to_vec(), b"2".to_vec()));
        let second = sample_frame();
        let mut data = first.serialize();
        let first_len = data.len();
        data.extend_from_slice(&second.serialize());

        let (decoded, consumed) = LogFrame::deserialize(&data).unwrap();
        assert_eq!(decoded, first);
        assert_eq!(consumed, first_len);
    }

    #[test]
    fn test_empty_frame_is_minimum_size() {
        assert_eq!(LogFrame::default().serialize().len(), MIN_FRAME_SIZE);
    }
}
