//! CRUD Operations
//!
//! insert / find / edit / delete / contains plus a full scan. Lookups walk
//! the trie without creating nodes, then check the main block and, when the
//! bucket has one, its overflow chain.

use super::core::DynamicHash;
use crate::index::Lookup;
use crate::types::{KeyHasher, Record};
use crate::{Result, StorageError};

impl<R: Record, H: KeyHasher<R::Key>> DynamicHash<R, H> {
    /// Insert a record with a key not yet present.
    ///
    /// Full buckets split while below max depth; at max depth the record
    /// goes to the bucket's overflow chain.
    pub fn insert(&mut self, record: R) -> Result<()> {
        self.ensure_usable()?;
        let result = self.insert_impl(record);
        self.track(result)
    }

    fn insert_impl(&mut self, record: R) -> Result<()> {
        let bits = self.hash_of(record.key());
        if self.lookup_record(record.key())?.is_some() {
            return Err(StorageError::DuplicateKey(format!("{:?}", record.key())));
        }

        let leaf = self.leaf_for_insert(bits)?;
        let leaf = self.split_full(leaf, bits)?;
        let bucket = *self.trie.bucket(leaf)?;
        let mut block = self.main.read_block(bucket.block_address)?;

        if !block.is_full() {
            block.insert(record)?;
            self.main.write_block(&block)?;
            self.trie.bucket_mut(leaf)?.main_size += 1;
        } else {
            if self.trie.can_split(leaf) {
                return Err(StorageError::Corruption(format!(
                    "bucket '{}' is full below max depth (recorded main size {})",
                    self.trie.node(leaf).route,
                    bucket.main_size
                )));
            }
            if !self.config.overflow_enabled() {
                return Err(StorageError::CapacityExhausted(format!(
                    "bucket '{}' is full at max depth {} and overflow is disabled",
                    self.trie.node(leaf).route,
                    self.config.max_depth
                )));
            }

            let outcome = self.overflow.append(block.next, record)?;
            if block.next != Some(outcome.head) {
                block.next = Some(outcome.head);
                self.main.write_block(&block)?;
            }

            let bucket = self.trie.bucket_mut(leaf)?;
            bucket.overflow_size += 1;
            if outcome.added_block {
                bucket.chain_length += 1;
            }
        }

        self.size += 1;
        Ok(())
    }

    /// Record stored under `key`
    pub fn find(&self, key: &R::Key) -> Result<R> {
        self.ensure_usable()?;
        self.lookup_record(key)?
            .ok_or_else(|| StorageError::NotFound(format!("no record for key {:?}", key)))
    }

    /// Whether a record equal to `record` (key and payload) is stored
    pub fn contains(&self, record: &R) -> Result<bool> {
        self.ensure_usable()?;
        let Lookup::Leaf(leaf) = self.trie.lookup(self.hash_of(record.key())) else {
            return Ok(false);
        };

        let block = self.main.read_block(self.trie.bucket(leaf)?.block_address)?;
        if block.contains(record) {
            return Ok(true);
        }
        match block.next {
            Some(head) => self.overflow.contains(head, record),
            None => Ok(false),
        }
    }

    /// Replace the stored record equal to `old` with `new` in place.
    ///
    /// Both records must share a key.
    pub fn edit(&mut self, old: &R, new: R) -> Result<()> {
        self.ensure_usable()?;
        let result = self.edit_impl(old, new);
        self.track(result)
    }

    fn edit_impl(&mut self, old: &R, new: R) -> Result<()> {
        if old.key() != new.key() {
            return Err(StorageError::KeyMismatch(format!(
                "cannot replace key {:?} with key {:?}",
                old.key(),
                new.key()
            )));
        }

        let not_found = || StorageError::NotFound(format!("no record {:?} to edit", old));
        let Lookup::Leaf(leaf) = self.trie.lookup(self.hash_of(old.key())) else {
            return Err(not_found());
        };

        let mut block = self.main.read_block(self.trie.bucket(leaf)?.block_address)?;
        if block.replace(old, new.clone()) {
            return self.main.write_block(&block);
        }

        if let Some(head) = block.next {
            if self.overflow.replace(head, old, new)? {
                return Ok(());
            }
        }
        Err(not_found())
    }

    /// Remove and return the record with `key`.
    ///
    /// Afterwards the bucket pulls overflow records back into its main block
    /// when possible and merges with its sibling up the trie.
    pub fn delete(&mut self, key: &R::Key) -> Result<R> {
        self.ensure_usable()?;
        let result = self.delete_impl(key);
        self.track(result)
    }

    fn delete_impl(&mut self, key: &R::Key) -> Result<R> {
        let not_found = || StorageError::NotFound(format!("no record for key {:?}", key));
        let Lookup::Leaf(leaf) = self.trie.lookup(self.hash_of(key)) else {
            return Err(not_found());
        };

        let mut block = self.main.read_block(self.trie.bucket(leaf)?.block_address)?;

        let removed = if let Some(record) = block.delete(key) {
            self.trie.bucket_mut(leaf)?.main_size -= 1;
            record
        } else if let Some(head) = block.next {
            let removal = self.overflow.delete(head, key)?.ok_or_else(not_found)?;
            let bucket = self.trie.bucket_mut(leaf)?;
            bucket.overflow_size -= 1;
            if removal.merged_block {
                bucket.chain_length -= 1;
            }
            removal.record
        } else {
            return Err(not_found());
        };

        self.merge_with_overflow(leaf, &mut block)?;
        self.merge_upward(leaf, block)?;

        self.size -= 1;
        if self.size == 0 {
            self.reset_if_empty()?;
        }
        Ok(removed)
    }

    /// Every stored record, bucket by bucket
    pub fn records(&self) -> Result<Vec<R>> {
        self.ensure_usable()?;
        let mut records = Vec::with_capacity(self.size);
        for leaf in self.trie.leaves() {
            let block = self.main.read_block(self.trie.bucket(leaf)?.block_address)?;
            records.extend_from_slice(block.records());
            if let Some(head) = block.next {
                records.extend(self.overflow.records(head)?);
            }
        }
        Ok(records)
    }

    /// Main block, then overflow chain; no trie mutation
    pub(crate) fn lookup_record(&self, key: &R::Key) -> Result<Option<R>> {
        let Lookup::Leaf(leaf) = self.trie.lookup(self.hash_of(key)) else {
            return Ok(None);
        };

        let block = self.main.read_block(self.trie.bucket(leaf)?.block_address)?;
        if let Some(record) = block.find(key) {
            return Ok(Some(record.clone()));
        }
        match block.next {
            Some(head) => self.overflow.find(head, key),
            None => Ok(None),
        }
    }
}
