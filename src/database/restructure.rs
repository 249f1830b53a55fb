//! Directory restructuring
//!
//! Bucket splits on insert, and on delete: pulling overflow records back
//! into the main block, sibling merges up the trie, empty-leaf removal and
//! the reset of an emptied store.
//!
//! ## Split
//! ```text
//!   leaf "01" (full, block A)          internal "01"
//!                              =>      /            \
//!                              leaf "010" (new B)  leaf "011" (A)
//! ```
//! Records are redistributed on bit `level`; a child left with no records
//! is removed again and its block released.

use super::core::DynamicHash;
use crate::index::{Lookup, NodeId, Trie};
use crate::storage::Block;
use crate::types::{HashBits, KeyHasher, Record};
use crate::{Result, StorageError};
use tracing::{debug, info};

impl<R: Record, H: KeyHasher<R::Key>> DynamicHash<R, H> {
    /// Leaf an insert of `bits` lands in, attaching a fresh leaf (with a
    /// newly allocated block) when the path ends in a vacant slot.
    pub(crate) fn leaf_for_insert(&mut self, bits: HashBits) -> Result<NodeId> {
        match self.trie.lookup(bits) {
            Lookup::Leaf(id) => Ok(id),
            Lookup::Vacant { parent, right } => {
                let block = self.main.allocate()?;
                let id = self.trie.attach_leaf(parent, right, block.address)?;
                debug!(
                    "Attached leaf '{}' on block {}",
                    self.trie.node(id).route,
                    block.address
                );
                Ok(id)
            }
        }
    }

    /// Split `leaf` while its main block is full and it is below max depth.
    /// Returns the leaf `bits` routes to afterwards.
    pub(crate) fn split_full(&mut self, mut leaf: NodeId, bits: HashBits) -> Result<NodeId> {
        let block_factor = self.config.block_factor;

        while self.trie.bucket(leaf)?.main_size >= block_factor && self.trie.can_split(leaf) {
            let old = *self.trie.bucket(leaf)?;
            if old.has_overflow() {
                return Err(StorageError::Corruption(format!(
                    "bucket '{}' below max depth carries an overflow chain",
                    self.trie.node(leaf).route
                )));
            }

            let level = self.trie.level(leaf);
            let mut old_block = self.main.read_block(old.block_address)?;
            let records = old_block.take_records();
            let mut new_block = self.main.allocate()?;
            let (left, right) = self.trie.split(leaf, new_block.address)?;

            // Left child owns the new block, right child keeps the old one
            let (mut left_count, mut right_count) = (0, 0);
            for record in records {
                if self.hasher.hash_bits(record.key()).bit(level) {
                    old_block.insert(record)?;
                    right_count += 1;
                } else {
                    new_block.insert(record)?;
                    left_count += 1;
                }
            }
            self.trie.bucket_mut(left)?.main_size = left_count;
            self.trie.bucket_mut(right)?.main_size = right_count;

            debug!(
                "Split bucket '{}' at level {}: {} left (block {}), {} right (block {})",
                self.trie.node(leaf).route,
                level,
                left_count,
                new_block.address,
                right_count,
                old_block.address
            );

            let (target, target_block, other, other_block, other_count) = if bits.bit(level) {
                (right, old_block, left, new_block, left_count)
            } else {
                (left, new_block, right, old_block, right_count)
            };

            self.main.write_block(&target_block)?;
            if other_count == 0 {
                self.trie.remove_leaf(other)?;
                self.main.release(other_block)?;
            } else {
                self.main.write_block(&other_block)?;
            }

            leaf = target;
        }

        Ok(leaf)
    }

    /// Refill the main block of `leaf` from its overflow chain after a delete.
    ///
    /// The whole chain is pulled in when the bucket fits one block; an empty
    /// main block otherwise takes up to a block's worth from the chain tail.
    pub(crate) fn merge_with_overflow(&mut self, leaf: NodeId, block: &mut Block<R>) -> Result<()> {
        let block_factor = self.config.block_factor;
        let bucket = *self.trie.bucket(leaf)?;
        if !bucket.has_overflow() {
            return Ok(());
        }
        let Some(head) = block.next else {
            return Err(StorageError::Corruption(format!(
                "bucket '{}' reports {} overflow blocks but its main block has no chain",
                self.trie.node(leaf).route,
                bucket.chain_length - 1
            )));
        };

        if bucket.size() <= block_factor {
            let records = self.overflow.delete_chain(head)?;
            let pulled = records.len();
            for record in records {
                block.insert(record)?;
            }
            block.next = None;

            let bucket = self.trie.bucket_mut(leaf)?;
            bucket.main_size = block.len();
            bucket.overflow_size = 0;
            bucket.chain_length = 1;
            debug!("Pulled {} overflow records back into block {}", pulled, block.address);
        } else if bucket.main_size == 0 {
            let take = self.overflow.take_tail(head, block_factor)?;
            let moved = take.records.len();
            for record in take.records {
                block.insert(record)?;
            }
            block.next = take.head;

            let bucket = self.trie.bucket_mut(leaf)?;
            bucket.main_size += moved;
            bucket.overflow_size -= moved;
            bucket.chain_length -= take.released_blocks;
            if take.head.is_none() {
                bucket.chain_length = 1;
            }
            debug!(
                "Refilled empty block {} with {} overflow records",
                block.address, moved
            );
        }

        Ok(())
    }

    /// Whether `leaf` may fold into its parent together with `sibling`
    fn can_merge(&self, leaf: NodeId, sibling: Option<NodeId>) -> Result<bool> {
        let current = *self.trie.bucket(leaf)?;
        if current.has_overflow() || current.overflow_size > 0 {
            return Ok(false);
        }

        let Some(sibling) = sibling else {
            return Ok(true);
        };
        Ok(match self.trie.node(sibling).bucket() {
            Some(other) => {
                !other.has_overflow()
                    && other.overflow_size == 0
                    && current.main_size + other.main_size <= self.config.block_factor
            }
            None => false,
        })
    }

    /// Merge `leaf` (whose main block is `block`) upward while possible, then
    /// write the surviving block, or drop the leaf if it ended up empty
    /// below level 1.
    pub(crate) fn merge_upward(&mut self, leaf: NodeId, block: Block<R>) -> Result<()> {
        let mut current = leaf;
        let mut current_block = block;

        while let Some(parent) = self.trie.parent(current) {
            if parent == self.trie.root() {
                break;
            }
            let sibling = self.trie.sibling(current);
            if !self.can_merge(current, sibling)? {
                break;
            }

            let sibling_address = match sibling {
                Some(sib) => Some(self.trie.bucket(sib)?.block_address),
                None => None,
            };
            let merged = self.trie.merge(current, sibling)?;

            if let Some(sibling_address) = sibling_address {
                let target_address = self.trie.bucket(merged)?.block_address;
                let (mut source, mut target) = if target_address == current_block.address {
                    (self.main.read_block(sibling_address)?, current_block)
                } else {
                    (current_block, self.main.read_block(target_address)?)
                };
                for record in source.take_records() {
                    target.insert(record)?;
                }
                self.main.release(source)?;
                current_block = target;
            }

            debug!(
                "Merged into bucket '{}' on block {}",
                self.trie.node(merged).route,
                current_block.address
            );
            current = merged;
        }

        if self.trie.level(current) > 1 && self.trie.bucket(current)?.size() == 0 {
            let sibling = self.trie.sibling(current);
            debug!("Removing empty bucket '{}'", self.trie.node(current).route);
            self.trie.remove_leaf(current)?;
            self.main.release(current_block)?;

            // The remaining child may now fold into the parent on its own
            if let Some(sibling) = sibling {
                if let Some(bucket) = self.trie.node(sibling).bucket() {
                    let sibling_block = self.main.read_block(bucket.block_address)?;
                    self.merge_upward(sibling, sibling_block)?;
                }
            }
            return Ok(());
        }

        self.main.write_block(&current_block)
    }

    /// Return an emptied store to its initial layout: two level-1 leaves on
    /// blocks 0 and 1, no free blocks, an empty overflow file.
    pub(crate) fn reset_if_empty(&mut self) -> Result<()> {
        if self.size != 0 {
            return Ok(());
        }

        self.main.reset()?;
        self.overflow.reset()?;
        self.trie = Trie::new(0, self.main.block_size(), self.config.max_depth)?;
        info!("Hash store at {} emptied, layout reset", self.path.display());
        Ok(())
    }
}
