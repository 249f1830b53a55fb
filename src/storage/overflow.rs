//! Overflow Store
//!
//! A [`BlockFile`] hosting one chain of overflow blocks per bucket. Chains
//! are linked through `Block::next` and start at the address held in the
//! bucket's main block; the store keeps no directory of its own.
//!
//! ## Chain shape
//! ```text
//!   main block ──next──▶ [head] ──next──▶ [b1] ──next──▶ [tail]
//!                         full             full           partial
//! ```
//! Only buckets at the maximum trie depth own a chain. Appends fill the tail
//! block and add a block once it is full.
//!
//! ## Deletes
//! - Removing a record from a block that still has room in its predecessor
//!   merges the two and releases the emptied block
//! - `take_tail` drains records from the end of the chain so the bucket can
//!   pull them back into its main block
//! - `delete_chain` releases every block and returns the records
//!
//! ## Usage
//! ```ignore
//! let mut overflow: OverflowStore<Item> = OverflowStore::create("overflow.bin", 10)?;
//!
//! let outcome = overflow.append(None, Item::new(7, "seven"))?;
//! assert!(outcome.added_block);
//! assert_eq!(overflow.find(outcome.head, &7)?, Some(Item::new(7, "seven")));
//!
//! let removal = overflow.delete(outcome.head, &7)?;
//! ```

use super::block::Block;
use super::block_file::BlockFile;
use crate::types::Record;
use crate::Result;
use std::path::Path;
use tracing::debug;

/// Result of [`OverflowStore::append`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Chain head (newly allocated when the chain did not exist)
    pub head: u64,
    /// Whether a block was added to the chain
    pub added_block: bool,
}

/// Result of a successful [`OverflowStore::delete`]
#[derive(Debug, Clone, PartialEq)]
pub struct Removal<R> {
    pub record: R,
    /// The emptied block was merged into its predecessor and released
    pub merged_block: bool,
}

/// Records detached from the chain tail by [`OverflowStore::take_tail`]
#[derive(Debug, Clone, PartialEq)]
pub struct TailTake<R> {
    pub records: Vec<R>,
    /// Blocks released because they were emptied
    pub released_blocks: usize,
    /// Chain head afterwards (`None` when the whole chain was drained)
    pub head: Option<u64>,
}

/// Chained overflow blocks
pub struct OverflowStore<R: Record> {
    blocks: BlockFile<R>,
}

impl<R: Record> OverflowStore<R> {
    /// Create an empty overflow file
    pub fn create(path: impl AsRef<Path>, block_factor: usize) -> Result<Self> {
        Ok(Self {
            blocks: BlockFile::create(path, block_factor, 0)?,
        })
    }

    /// Reopen an overflow file
    pub fn open(path: impl AsRef<Path>, block_factor: usize, first_empty: u64) -> Result<Self> {
        Ok(Self {
            blocks: BlockFile::open(path, block_factor, 0, first_empty)?,
        })
    }

    /// Underlying block file
    pub fn blocks(&self) -> &BlockFile<R> {
        &self.blocks
    }

    /// Drop every chain
    pub fn reset(&mut self) -> Result<()> {
        self.blocks.reset()
    }

    /// Insert `record` into the first chain block with room, extending the
    /// chain (or starting it when `head` is `None`) if every block is full.
    pub fn append(&mut self, head: Option<u64>, record: R) -> Result<AppendOutcome> {
        let head = match head {
            Some(head) => head,
            None => {
                let mut block = self.blocks.allocate()?;
                block.insert(record)?;
                self.blocks.write_block(&block)?;
                return Ok(AppendOutcome {
                    head: block.address,
                    added_block: true,
                });
            }
        };

        let mut block = self.blocks.read_block(head)?;
        loop {
            if !block.is_full() {
                block.insert(record)?;
                self.blocks.write_block(&block)?;
                return Ok(AppendOutcome {
                    head,
                    added_block: false,
                });
            }

            match block.next {
                Some(next) => block = self.blocks.read_block(next)?,
                None => break,
            }
        }

        // Every block is full: link a new tail
        let mut tail = self.blocks.allocate()?;
        tail.insert(record)?;
        self.blocks.write_block(&tail)?;
        block.next = Some(tail.address);
        self.blocks.write_block(&block)?;

        Ok(AppendOutcome {
            head,
            added_block: true,
        })
    }

    /// Find the record with `key` in the chain
    pub fn find(&self, head: u64, key: &R::Key) -> Result<Option<R>> {
        let mut cursor = Some(head);
        while let Some(address) = cursor {
            let block = self.blocks.read_block(address)?;
            if let Some(record) = block.find(key) {
                return Ok(Some(record.clone()));
            }
            cursor = block.next;
        }
        Ok(None)
    }

    /// Whether a record equal to `record` is in the chain
    pub fn contains(&self, head: u64, record: &R) -> Result<bool> {
        let mut cursor = Some(head);
        while let Some(address) = cursor {
            let block = self.blocks.read_block(address)?;
            if block.contains(record) {
                return Ok(true);
            }
            cursor = block.next;
        }
        Ok(false)
    }

    /// Replace the record equal to `old` with `new` in place
    pub fn replace(&mut self, head: u64, old: &R, new: R) -> Result<bool> {
        let mut cursor = Some(head);
        while let Some(address) = cursor {
            let mut block = self.blocks.read_block(address)?;
            if block.replace(old, new.clone()) {
                self.blocks.write_block(&block)?;
                return Ok(true);
            }
            cursor = block.next;
        }
        Ok(false)
    }

    /// Remove the record with `key`, merging its block into the predecessor
    /// when both fit in one block.
    pub fn delete(&mut self, head: u64, key: &R::Key) -> Result<Option<Removal<R>>> {
        let mut previous: Option<Block<R>> = None;
        let mut block = self.blocks.read_block(head)?;

        let record = loop {
            if let Some(record) = block.delete(key) {
                break record;
            }
            match block.next {
                Some(next) => {
                    let following = self.blocks.read_block(next)?;
                    previous = Some(std::mem::replace(&mut block, following));
                }
                None => return Ok(None),
            }
        };

        let merged_block = match previous {
            Some(mut prev) if prev.len() + block.len() <= prev.block_factor() => {
                for moved in block.take_records() {
                    prev.insert(moved)?;
                }
                prev.next = block.next;
                self.blocks.write_block(&prev)?;
                debug!(
                    "Merged overflow block {} into predecessor {}",
                    block.address, prev.address
                );
                self.blocks.release(block)?;
                true
            }
            _ => {
                self.blocks.write_block(&block)?;
                false
            }
        };

        Ok(Some(Removal {
            record,
            merged_block,
        }))
    }

    /// Release every block of the chain and return its records
    pub fn delete_chain(&mut self, head: u64) -> Result<Vec<R>> {
        let mut records = Vec::new();
        let mut cursor = Some(head);
        while let Some(address) = cursor {
            let mut block = self.blocks.read_block(address)?;
            cursor = block.next;
            records.extend(block.take_records());
            self.blocks.release(block)?;
        }
        Ok(records)
    }

    /// All records of the chain, without mutation
    pub fn records(&self, head: u64) -> Result<Vec<R>> {
        let mut records = Vec::new();
        let mut cursor = Some(head);
        while let Some(address) = cursor {
            let block = self.blocks.read_block(address)?;
            cursor = block.next;
            records.extend_from_slice(block.records());
        }
        Ok(records)
    }

    /// Block addresses of the chain, head first
    pub fn chain(&self, head: u64) -> Result<Vec<u64>> {
        let mut addresses = Vec::new();
        let mut cursor = Some(head);
        while let Some(address) = cursor {
            let block = self.blocks.read_block(address)?;
            addresses.push(address);
            cursor = block.next;
        }
        Ok(addresses)
    }

    /// Detach up to `count` records from the end of the chain, releasing
    /// blocks that end up empty.
    pub fn take_tail(&mut self, head: u64, count: usize) -> Result<TailTake<R>> {
        let addresses = self.chain(head)?;
        let mut records = Vec::with_capacity(count);
        let mut released_blocks = 0;
        let mut new_head = Some(head);

        for idx in (0..addresses.len()).rev() {
            if records.len() == count {
                break;
            }

            let mut block = self.blocks.read_block(addresses[idx])?;
            while records.len() < count {
                match block.pop() {
                    Some(record) => records.push(record),
                    None => break,
                }
            }

            if !block.is_empty() {
                self.blocks.write_block(&block)?;
                continue;
            }

            // Emptied: cut it off the chain (everything after it is gone already)
            if idx > 0 {
                let mut pred = self.blocks.read_block(addresses[idx - 1])?;
                pred.next = None;
                self.blocks.write_block(&pred)?;
            } else {
                new_head = None;
            }
            self.blocks.release(block)?;
            released_blocks += 1;
        }

        Ok(TailTake {
            records,
            released_blocks,
            head: new_head,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Item;
    use tempfile::TempDir;

    fn create_store() -> (OverflowStore<Item>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = OverflowStore::create(temp_dir.path().join("overflow.bin"), 2).unwrap();
        (store, temp_dir)
    }

    fn item(id: u64) -> Item {
        Item::new(id, format!("ovf-{}", id))
    }

    /// Chain of `n` records starting from nothing
    fn build_chain(store: &mut OverflowStore<Item>, ids: &[u64]) -> (u64, usize) {
        let mut head = None;
        let mut added = 0;
        for &id in ids {
            let outcome = store.append(head, item(id)).unwrap();
            head = Some(outcome.head);
            if outcome.added_block {
                added += 1;
            }
        }
        (head.unwrap(), added)
    }

    #[test]
    fn test_append_allocates_lazily_and_links() {
        let (mut store, _temp) = create_store();
        let (head, added) = build_chain(&mut store, &[1, 2, 3, 4, 5]);
        assert_eq!(added, 3);
        assert_eq!(store.chain(head).unwrap().len(), 3);

        for id in 1..=5 {
            assert_eq!(store.find(head, &id).unwrap(), Some(item(id)));
        }
        assert_eq!(store.find(head, &99).unwrap(), None);
        assert!(store.contains(head, &item(4)).unwrap());
        assert!(!store.contains(head, &Item::new(4, "other")).unwrap());
    }

    #[test]
    fn test_delete_merges_into_predecessor() {
        let (mut store, _temp) = create_store();
        let (head, _) = build_chain(&mut store, &[1, 2, 3, 4]);

        // Second block [3, 4] -> [4]; 2 + 1 > 2, no merge
        let removal = store.delete(head, &3).unwrap().unwrap();
        assert!(!removal.merged_block);

        // First block [1, 2] -> [2]; head has no predecessor
        assert!(!store.delete(head, &1).unwrap().unwrap().merged_block);

        // Second block [4] -> []; 1 + 0 fits, merged and released
        let removal = store.delete(head, &4).unwrap().unwrap();
        assert!(removal.merged_block);
        assert_eq!(store.chain(head).unwrap(), vec![head]);
        assert_eq!(store.records(head).unwrap(), vec![item(2)]);

        assert!(store.delete(head, &42).unwrap().is_none());
    }

    #[test]
    fn test_delete_chain_returns_everything() {
        let (mut store, _temp) = create_store();
        let (head, _) = build_chain(&mut store, &[1, 2, 3]);
        let mut ids: Vec<u64> = store.delete_chain(head).unwrap().iter().map(|r| r.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(store.blocks().len(), 0);
    }

    #[test]
    fn test_take_tail_releases_emptied_blocks() {
        let (mut store, _temp) = create_store();
        let (head, _) = build_chain(&mut store, &[1, 2, 3, 4, 5]);

        let take = store.take_tail(head, 2).unwrap();
        let ids: Vec<u64> = take.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![5, 4]);
        assert_eq!(take.released_blocks, 1);
        assert_eq!(take.head, Some(head));
        assert_eq!(store.chain(head).unwrap().len(), 2);
        assert_eq!(store.records(head).unwrap().len(), 3);

        let take = store.take_tail(head, 10).unwrap();
        assert_eq!(take.records.len(), 3);
        assert_eq!(take.released_blocks, 2);
        assert_eq!(take.head, None);
        assert_eq!(store.blocks().len(), 0);
    }

    #[test]
    fn test_replace_in_chain() {
        let (mut store, _temp) = create_store();
        let (head, _) = build_chain(&mut store, &[1, 2, 3]);
        assert!(store.replace(head, &item(3), Item::new(3, "edited")).unwrap());
        assert_eq!(store.find(head, &3).unwrap().unwrap().label, "edited");
        assert!(!store.replace(head, &item(3), Item::new(3, "again")).unwrap());
    }
}
