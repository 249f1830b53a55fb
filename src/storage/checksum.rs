//! Checksummed framing for small persisted blobs
//!
//! Wraps a payload in a frame that is rejected on read when it was truncated,
//! overwritten by something else or altered by a single bit.
//!
//! ## Use cases
//! - `trie.bin`: the bincode dump of the trie leaves written by `save()`
//!
//! Block files are not framed. A block is overwritten in place on every
//! insert and delete, and its header fields are validated on decode instead.
//!
//! ## Frame format (little-endian)
//! ```text
//! [magic: u32 = "DHTR"][payload_len: u32][payload][crc32(payload): u32]
//! ```
//!
//! ## Algorithm
//! - **CRC32** (IEEE) through `crc32fast`, SIMD accelerated where available
//!
//! ## Usage
//! ```ignore
//! use dynhash::storage::checksum;
//!
//! // Writing
//! let framed = checksum::frame(&payload);
//! std::fs::write(&path, &framed)?;
//!
//! // Reading: Corruption on bad magic, length or CRC
//! let bytes = std::fs::read(&path)?;
//! let payload = checksum::unframe(&bytes)?;
//! ```

use crate::{Result, StorageError};
use crc32fast::Hasher;

/// ASCII "DHTR"
pub const FRAME_MAGIC: u32 = 0x4448_5452;

const FRAME_OVERHEAD: usize = 4 + 4 + 4;

/// CRC32 of `data`
pub fn compute(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Wrap `payload` in a checksummed frame
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    out.extend_from_slice(&FRAME_MAGIC.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&compute(payload).to_le_bytes());
    out
}

/// Validate a frame and return its payload
pub fn unframe(encoded: &[u8]) -> Result<&[u8]> {
    if encoded.len() < FRAME_OVERHEAD {
        return Err(StorageError::Corruption(format!(
            "Frame too short: {} bytes",
            encoded.len()
        )));
    }

    let magic = read_u32(&encoded[0..4]);
    if magic != FRAME_MAGIC {
        return Err(StorageError::Corruption(format!(
            "Invalid frame magic: expected 0x{:08X}, got 0x{:08X}",
            FRAME_MAGIC, magic
        )));
    }

    let len = read_u32(&encoded[4..8]) as usize;
    if encoded.len() != len + FRAME_OVERHEAD {
        return Err(StorageError::Corruption(format!(
            "Frame length mismatch: expected {} bytes, got {}",
            len + FRAME_OVERHEAD,
            encoded.len()
        )));
    }

    let payload = &encoded[8..8 + len];
    let expected = read_u32(&encoded[8 + len..]);
    let actual = compute(payload);
    if actual != expected {
        return Err(StorageError::Corruption(format!(
            "Checksum mismatch: expected 0x{:08X}, got 0x{:08X}",
            expected, actual
        )));
    }

    Ok(payload)
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_unframe() {
        let framed = frame(b"route table");
        assert_eq!(unframe(&framed).unwrap(), b"route table");
    }

    #[test]
    fn test_detects_bit_flip() {
        let mut framed = frame(b"route table");
        framed[10] ^= 0x01;
        assert!(matches!(unframe(&framed), Err(StorageError::Corruption(_))));
    }

    #[test]
    fn test_detects_truncation() {
        let framed = frame(b"abc");
        assert!(unframe(&framed[..framed.len() - 1]).is_err());
        assert!(unframe(&[1, 2]).is_err());
    }
}
