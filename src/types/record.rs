//! Record capability required of every stored type
//!
//! A record has a key (compared for equality, hashed for routing) and
//! encodes into exactly `SIZE` bytes, so a block of `block_factor` records
//! has a fixed size on disk.

use crate::Result;
use std::fmt::Debug;

/// A fixed-size, binary-encodable value with a unique key.
///
/// Blocks store records in `SIZE`-byte slots, so `encode` must always fill
/// exactly `SIZE` bytes and `decode` must accept what `encode` produced.
/// Equality is full value equality (key plus payload); it is what
/// `contains` and `edit` match against.
pub trait Record: Clone + PartialEq + Debug + Send + Sync {
    /// Unique key type
    type Key: Eq + Clone + Debug + Send + Sync;

    /// Encoded size in bytes
    const SIZE: usize;

    /// Key of this record
    fn key(&self) -> &Self::Key;

    /// Write the record into `buf` (`buf.len() == Self::SIZE`)
    fn encode(&self, buf: &mut [u8]);

    /// Rebuild a record from `buf` (`buf.len() == Self::SIZE`)
    fn decode(buf: &[u8]) -> Result<Self>;
}
