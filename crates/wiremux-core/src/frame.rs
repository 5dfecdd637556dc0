//! Wire frame codec
//!
//! One frame = a 5-byte header followed by an opaque payload:
//!
//! | field      | size    | meaning                                   |
//! |------------|---------|-------------------------------------------|
//! | signature  | 1 byte  | constant marker validating frame start    |
//! | total len  | 4 bytes | header + payload length, u32 little-endian|
//! | payload    | rest    | opaque message bytes                      |
//!
//! The receiver validates the signature on every new header; a mismatch or
//! an out-of-bounds length is a protocol violation and kills the
//! connection, not the process.

use crate::error::FrameError;

/// Marker byte opening every frame.
pub const FRAME_SIGNATURE: u8 = 0xC9;

/// Bytes in the fixed frame header.
pub const HEADER_LEN: usize = 5;

/// Upper bound on one whole frame (header + payload).
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Largest payload that fits a legal frame.
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - HEADER_LEN;

/// Pack a payload into a ready-to-send frame.
pub fn pack(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge(payload.len()));
    }
    let total = (HEADER_LEN + payload.len()) as u32;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(FRAME_SIGNATURE);
    frame.extend_from_slice(&total.to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Parse a complete header, returning the payload length that follows it.
pub fn parse_header(header: &[u8; HEADER_LEN]) -> Result<usize, FrameError> {
    if header[0] != FRAME_SIGNATURE {
        return Err(FrameError::BadSignature(header[0]));
    }
    let total = u32::from_le_bytes([header[1], header[2], header[3], header[4]]);
    if (total as usize) > MAX_FRAME_LEN {
        return Err(FrameError::Oversize(total));
    }
    if (total as usize) < HEADER_LEN {
        return Err(FrameError::Undersize(total));
    }
    Ok(total as usize - HEADER_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(payload: &[u8]) {
        let frame = pack(payload).unwrap();
        assert_eq!(frame.len(), HEADER_LEN + payload.len());
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&frame[..HEADER_LEN]);
        let body_len = parse_header(&header).unwrap();
        assert_eq!(body_len, payload.len());
        assert_eq!(&frame[HEADER_LEN..], payload);
    }

    #[test]
    fn test_roundtrip_empty() {
        roundtrip(b"");
    }

    #[test]
    fn test_roundtrip_small() {
        roundtrip(b"hello, wire");
    }

    #[test]
    fn test_roundtrip_binary() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        roundtrip(&payload);
    }

    #[test]
    fn test_roundtrip_max_payload() {
        let payload = vec![0xabu8; MAX_PAYLOAD_LEN];
        roundtrip(&payload);
    }

    #[test]
    fn test_payload_too_large() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert_eq!(
            pack(&payload),
            Err(FrameError::PayloadTooLarge(MAX_PAYLOAD_LEN + 1))
        );
    }

    #[test]
    fn test_bad_signature() {
        let mut header = [0u8; HEADER_LEN];
        header[0] = 0x00;
        header[1..].copy_from_slice(&(HEADER_LEN as u32).to_le_bytes());
        assert_eq!(parse_header(&header), Err(FrameError::BadSignature(0x00)));
    }

    #[test]
    fn test_oversize_header() {
        let mut header = [0u8; HEADER_LEN];
        header[0] = FRAME_SIGNATURE;
        header[1..].copy_from_slice(&((MAX_FRAME_LEN as u32) + 1).to_le_bytes());
        assert!(matches!(parse_header(&header), Err(FrameError::Oversize(_))));
    }

    #[test]
    fn test_undersize_header() {
        let mut header = [0u8; HEADER_LEN];
        header[0] = FRAME_SIGNATURE;
        header[1..].copy_from_slice(&2u32.to_le_bytes());
        assert_eq!(parse_header(&header), Err(FrameError::Undersize(2)));
    }

    #[test]
    fn test_length_is_little_endian() {
        let frame = pack(&[0u8; 3]).unwrap();
        // total = 5 + 3 = 8, LE
        assert_eq!(&frame[1..HEADER_LEN], &[8, 0, 0, 0]);
    }
}
