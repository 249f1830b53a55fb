//! Fixed-capacity record block
//!
//! ## On-disk layout (little-endian)
//! ```text
//! [valid: i32][next: i64][previous: i64][record 0]...[record block_factor-1]
//! ```
//! `next`/`previous` are file offsets, -1 for none. Slots past `valid` are
//! zero-filled on encode and ignored on decode. The block's own address is
//! not stored; it is the offset the block was read from.
//!
//! ## Usage
//! ```ignore
//! let mut block: Block<Item> = Block::new(6, 0);
//! block.insert(Item::new(1, "one"))?;
//!
//! let bytes = block.encode();
//! assert_eq!(bytes.len(), Block::<Item>::size_for(6));
//! let back = Block::<Item>::decode(6, 0, &bytes)?;
//! assert_eq!(back.find(&1), Some(&Item::new(1, "one")));
//! ```

use crate::types::Record;
use crate::{Result, StorageError};

/// Header: valid count + next + previous
pub const BLOCK_HEADER_SIZE: usize = 4 + 8 + 8;

/// On-disk marker for a missing link
const NO_LINK: i64 = -1;

/// One block of a block file
#[derive(Debug, Clone, PartialEq)]
pub struct Block<R: Record> {
    /// File offset this block lives at
    pub address: u64,

    /// Overflow link (main/overflow chains) or free-list successor
    pub next: Option<u64>,

    /// Free-list predecessor
    pub previous: Option<u64>,

    block_factor: usize,
    records: Vec<R>,
}

impl<R: Record> Block<R> {
    /// Empty block at `address`
    pub fn new(block_factor: usize, address: u64) -> Self {
        Self {
            address,
            next: None,
            previous: None,
            block_factor,
            records: Vec::with_capacity(block_factor),
        }
    }

    /// Encoded size of a block holding `block_factor` records
    pub const fn size_for(block_factor: usize) -> usize {
        BLOCK_HEADER_SIZE + block_factor * R::SIZE
    }

    pub fn block_factor(&self) -> usize {
        self.block_factor
    }

    /// Number of valid records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.block_factor
    }

    /// Free slots left
    pub fn remaining(&self) -> usize {
        self.block_factor - self.records.len()
    }

    /// Append `record` into the next free slot
    pub fn insert(&mut self, record: R) -> Result<()> {
        if self.is_full() {
            return Err(StorageError::BlockFull {
                capacity: self.block_factor,
            });
        }
        if self.find(record.key()).is_some() {
            return Err(StorageError::DuplicateKey(format!("{:?}", record.key())));
        }
        self.records.push(record);
        Ok(())
    }

    /// Linear scan for `key`
    pub fn find(&self, key: &R::Key) -> Option<&R> {
        self.records.iter().find(|r| r.key() == key)
    }

    /// Whether a record equal to `record` is stored
    pub fn contains(&self, record: &R) -> bool {
        self.records.iter().any(|r| r == record)
    }

    /// Replace the slot equal to `old` with `new`
    pub fn replace(&mut self, old: &R, new: R) -> bool {
        match self.records.iter_mut().find(|r| *r == old) {
            Some(slot) => {
                *slot = new;
                true
            }
            None => false,
        }
    }

    /// Remove the record with `key`; the last record takes its slot
    pub fn delete(&mut self, key: &R::Key) -> Option<R> {
        let idx = self.records.iter().position(|r| r.key() == key)?;
        Some(self.records.swap_remove(idx))
    }

    /// Remove the record in the last valid slot
    pub fn pop(&mut self) -> Option<R> {
        self.records.pop()
    }

    /// Valid records in slot order
    pub fn records(&self) -> &[R] {
        &self.records
    }

    /// Move all records out, leaving the block empty
    pub fn take_records(&mut self) -> Vec<R> {
        std::mem::take(&mut self.records)
    }

    /// Drop records and links (free-block state)
    pub fn clear(&mut self) {
        self.records.clear();
        self.next = None;
        self.previous = None;
    }

    /// Serialize to exactly `size_for(block_factor)` bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::size_for(self.block_factor)];
        buf[0..4].copy_from_slice(&(self.records.len() as i32).to_le_bytes());
        buf[4..12].copy_from_slice(&link_to_disk(self.next).to_le_bytes());
        buf[12..20].copy_from_slice(&link_to_disk(self.previous).to_le_bytes());

        let mut offset = BLOCK_HEADER_SIZE;
        for record in &self.records {
            record.encode(&mut buf[offset..offset + R::SIZE]);
            offset += R::SIZE;
        }
        buf
    }

    /// Deserialize a block read from `address`
    pub fn decode(block_factor: usize, address: u64, buf: &[u8]) -> Result<Self> {
        let expected = Self::size_for(block_factor);
        if buf.len() < expected {
            return Err(StorageError::InvalidArgument(format!(
                "Block buffer too small: {} < {}",
                buf.len(),
                expected
            )));
        }

        let valid = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        // Validate count to prevent corruption-induced panics
        if valid < 0 || valid as usize > block_factor {
            return Err(StorageError::Corruption(format!(
                "Invalid valid count in block {}: {} (block factor {})",
                address, valid, block_factor
            )));
        }

        let next = link_from_disk(read_i64(&buf[4..12]), address)?;
        let previous = link_from_disk(read_i64(&buf[12..20]), address)?;

        let mut records = Vec::with_capacity(block_factor);
        let mut offset = BLOCK_HEADER_SIZE;
        for _ in 0..valid {
            records.push(R::decode(&buf[offset..offset + R::SIZE])?);
            offset += R::SIZE;
        }

        Ok(Self {
            address,
            next,
            previous,
            block_factor,
            records,
        })
    }
}

fn read_i64(bytes: &[u8]) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    i64::from_le_bytes(raw)
}

fn link_to_disk(link: Option<u64>) -> i64 {
    link.map(|a| a as i64).unwrap_or(NO_LINK)
}

fn link_from_disk(raw: i64, address: u64) -> Result<Option<u64>> {
    match raw {
        NO_LINK => Ok(None),
        a if a >= 0 => Ok(Some(a as u64)),
        other => Err(StorageError::Corruption(format!(
            "Invalid link {} in block {}",
            other, address
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Item;

    fn item(id: u64) -> Item {
        Item::new(id, format!("item-{}", id))
    }

    #[test]
    fn test_insert_until_full() {
        let mut block = Block::new(2, 0);
        block.insert(item(1)).unwrap();
        block.insert(item(2)).unwrap();
        assert!(block.is_full());
        assert!(matches!(
            block.insert(item(3)),
            Err(StorageError::BlockFull { capacity: 2 })
        ));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut block = Block::new(3, 0);
        block.insert(item(1)).unwrap();
        let err = block.insert(Item::new(1, "other")).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey(_)));
        assert_eq!(block.len(), 1);
    }

    #[test]
    fn test_delete_swaps_last_into_hole() {
        let mut block = Block::new(4, 0);
        for id in 1..=4 {
            block.insert(item(id)).unwrap();
        }
        assert_eq!(block.delete(&2), Some(item(2)));
        let ids: Vec<u64> = block.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 4, 3]);
        assert_eq!(block.delete(&2), None);
    }

    #[test]
    fn test_replace_requires_equal_record() {
        let mut block = Block::new(2, 0);
        block.insert(item(1)).unwrap();
        assert!(!block.replace(&Item::new(1, "stale"), Item::new(1, "new")));
        assert!(block.replace(&item(1), Item::new(1, "new")));
        assert_eq!(block.find(&1).unwrap().label, "new");
    }

    #[test]
    fn test_encode_decode_with_links() {
        let mut block = Block::new(3, 96);
        block.insert(item(5)).unwrap();
        block.insert(item(9)).unwrap();
        block.next = Some(4096);

        let bytes = block.encode();
        assert_eq!(bytes.len(), Block::<Item>::size_for(3));

        let decoded = Block::<Item>::decode(3, 96, &bytes).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(decoded.previous, None);
    }

    #[test]
    fn test_decode_rejects_bad_count() {
        let mut bytes = Block::<Item>::new(2, 0).encode();
        bytes[0..4].copy_from_slice(&3i32.to_le_bytes());
        assert!(matches!(
            Block::<Item>::decode(2, 0, &bytes),
            Err(StorageError::Corruption(_))
        ));
    }
}
