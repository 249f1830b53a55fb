//! Fixed-width string slots for record codecs
//!
//! Layout: `[len: u32][bytes: max_len]`, unused tail zero-filled.

use crate::{Result, StorageError};

/// Encoded size of a string slot holding up to `max_len` bytes
pub const fn encoded_len(max_len: usize) -> usize {
    4 + max_len
}

/// Longest prefix of `value` that fits in `max_len` bytes without splitting a char
pub fn truncate_to(value: &str, max_len: usize) -> &str {
    if value.len() <= max_len {
        return value;
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Write `value` into `buf` (`buf.len() == encoded_len(max_len)`), truncating if needed
pub fn encode(value: &str, max_len: usize, buf: &mut [u8]) {
    let value = truncate_to(value, max_len);
    buf[..4].copy_from_slice(&(value.len() as u32).to_le_bytes());
    buf[4..4 + value.len()].copy_from_slice(value.as_bytes());
    buf[4 + value.len()..encoded_len(max_len)].fill(0);
}

/// Read a string slot written by [`encode`]
pub fn decode(buf: &[u8], max_len: usize) -> Result<String> {
    if buf.len() < encoded_len(max_len) {
        return Err(StorageError::Serialization(format!(
            "string slot too small: {} < {}",
            buf.len(),
            encoded_len(max_len)
        )));
    }
    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > max_len {
        return Err(StorageError::Corruption(format!(
            "string length {} exceeds slot width {}",
            len, max_len
        )));
    }
    String::from_utf8(buf[4..4 + len].to_vec())
        .map_err(|e| StorageError::Serialization(format!("invalid UTF-8 in string slot: {}", e)))
}
