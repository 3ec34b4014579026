//! Frame checksums: CRC32 (IEEE) over the frame bytes preceding the checksum.

pub fn compute_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        assert_eq!(compute_checksum(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_checksum(b""), 0);
    }

    #[test]
    fn test_single_bit_flip_detected() {
        let mut frame = b"put settings theme dark".to_vec();
        let checksum = compute_checksum(&frame);
        assert!(verify_checksum(&frame, checksum));

        frame[4] ^= 0x01;
        assert!(!verify_checksum(&frame, checksum));
    }
}
