//! Persistence and Recovery
//!
//! Store directory layout:
//! ```text
//! <dir>/main.bin            main blocks
//! <dir>/overflow.bin        overflow blocks
//! <dir>/trie.bin            framed bincode dump of the trie leaves
//! <dir>/overflow_meta.json
//! <dir>/main_meta.json      written last; its presence marks a saved store
//! ```
//! Nothing is persisted implicitly: state written by `save()` is what a
//! later `open()` sees.

use super::core::{DynamicHash, MAIN_FILE, MAIN_META, MAIN_MIN_BLOCKS, OVERFLOW_FILE, OVERFLOW_META, TRIE_FILE};
use crate::config::HashConfig;
use crate::index::{LeafRecord, Trie};
use crate::storage::{checksum, metadata, Block, BlockFile, HashMetadata, OverflowMetadata, OverflowStore, METADATA_VERSION};
use crate::types::{HashBits, KeyHasher, Record};
use crate::{Result, StorageError};
use std::path::{Path, PathBuf};
use tracing::info;

impl<R: Record, H: KeyHasher<R::Key>> DynamicHash<R, H> {
    /// Rebuild a store from a saved directory
    pub(crate) fn reopen(path: PathBuf, config: HashConfig, hasher: H) -> Result<Self> {
        let main_meta: HashMetadata = metadata::read(&path.join(MAIN_META))?;
        main_meta.check_compatible(
            config.block_factor,
            Block::<R>::size_for(config.block_factor),
            config.max_depth,
            config.overflow_block_factor,
        )?;

        let overflow_meta: OverflowMetadata = metadata::read(&path.join(OVERFLOW_META))?;
        overflow_meta.check_compatible(
            config.overflow_block_factor,
            Block::<R>::size_for(config.overflow_block_factor),
        )?;

        let main = BlockFile::open(
            path.join(MAIN_FILE),
            config.block_factor,
            MAIN_MIN_BLOCKS,
            main_meta.first_empty_block,
        )?;
        let overflow = OverflowStore::open(
            path.join(OVERFLOW_FILE),
            config.overflow_block_factor,
            overflow_meta.first_empty_block,
        )?;
        let trie = load_trie(&path, config.max_depth)?;

        let counted: usize = trie.dump().iter().map(|row| row.main_size + row.overflow_size).sum();
        if counted != main_meta.size {
            return Err(StorageError::Corruption(format!(
                "trie holds {} records but metadata records {}",
                counted, main_meta.size
            )));
        }

        info!(
            "Opened hash store at {} ({} records, {} buckets, depth {})",
            path.display(),
            main_meta.size,
            trie.leaf_count(),
            trie.depth()
        );

        Ok(Self {
            path,
            config,
            main,
            overflow,
            trie,
            hasher,
            size: main_meta.size,
            poisoned: false,
        })
    }

    /// Persist metadata and the trie so a later `open()` sees the current
    /// state. Block files are fsynced first when `sync_on_save` is set.
    pub fn save(&mut self) -> Result<()> {
        self.ensure_usable()?;
        let result = self.save_impl();
        self.track(result)
    }

    fn save_impl(&mut self) -> Result<()> {
        if self.config.sync_on_save {
            self.main.sync()?;
            self.overflow.blocks().sync()?;
        }

        let dump = bincode::serialize(&self.trie.dump())?;
        metadata::write_bytes_atomic(&self.path.join(TRIE_FILE), &checksum::frame(&dump))?;

        let overflow_meta = OverflowMetadata {
            block_factor: self.config.overflow_block_factor,
            first_empty_block: self.overflow.blocks().first_empty(),
            block_size: Block::<R>::size_for(self.config.overflow_block_factor),
        };
        metadata::write_atomic(&self.path.join(OVERFLOW_META), &overflow_meta)?;

        let main_meta = HashMetadata {
            version: METADATA_VERSION,
            block_factor: self.config.block_factor,
            first_empty_block: self.main.first_empty(),
            block_size: Block::<R>::size_for(self.config.block_factor),
            size: self.size,
            trie_max_depth: self.config.max_depth,
            overflow_block_factor: self.config.overflow_block_factor,
        };
        metadata::write_atomic(&self.path.join(MAIN_META), &main_meta)?;

        info!(
            "Saved hash store at {} ({} records, {} buckets)",
            self.path.display(),
            self.size,
            self.trie.leaf_count()
        );
        Ok(())
    }

    /// Save and release the files
    pub fn close(mut self) -> Result<()> {
        self.save()
    }

    /// Drop every record and re-create the store with a new geometry.
    ///
    /// Both block files are recreated for `config`, the directory goes back
    /// to two empty level-1 leaves, and the new layout is saved right away
    /// so a later `open()` must use `config`. A poisoned instance becomes
    /// usable again once the reset succeeds.
    pub fn reset(&mut self, config: HashConfig) -> Result<()> {
        config.validate()?;
        let result = self.reset_impl(config);
        self.track(result)
    }

    fn reset_impl(&mut self, config: HashConfig) -> Result<()> {
        self.main = BlockFile::create(self.path.join(MAIN_FILE), config.block_factor, MAIN_MIN_BLOCKS)?;
        self.overflow = OverflowStore::create(self.path.join(OVERFLOW_FILE), config.overflow_block_factor)?;
        self.trie = Trie::new(0, self.main.block_size(), config.max_depth)?;
        self.size = 0;
        self.poisoned = false;

        info!(
            "Reset hash store at {} (block factor {} -> {}, overflow block factor {} -> {}, max depth {} -> {})",
            self.path.display(),
            self.config.block_factor,
            config.block_factor,
            self.config.overflow_block_factor,
            config.overflow_block_factor,
            self.config.max_depth,
            config.max_depth
        );
        self.config = config;

        self.save_impl()
    }

    /// Check on-disk state against the in-memory directory.
    ///
    /// Walks both free chains, then checks for every bucket that block
    /// contents match the recorded counts and that each record routes to
    /// the bucket holding it.
    pub fn verify(&self) -> Result<()> {
        self.ensure_usable()?;
        self.main.free_chain()?;
        self.overflow.blocks().free_chain()?;

        let mut total = 0;
        for leaf in self.trie.leaves() {
            let node = self.trie.node(leaf);
            let bucket = *self.trie.bucket(leaf)?;
            let block = self.main.read_block(bucket.block_address)?;

            if node.route.len() != node.level {
                return Err(corrupt(&node.route, format!("route length differs from level {}", node.level)));
            }
            if block.len() != bucket.main_size {
                return Err(corrupt(
                    &node.route,
                    format!("main block holds {} records, expected {}", block.len(), bucket.main_size),
                ));
            }

            let (overflow_records, chain_length) = match block.next {
                Some(head) => (self.overflow.records(head)?, self.overflow.chain(head)?.len() + 1),
                None => (Vec::new(), 1),
            };
            if overflow_records.len() != bucket.overflow_size || chain_length != bucket.chain_length {
                return Err(corrupt(
                    &node.route,
                    format!(
                        "overflow holds {} records in {} blocks, expected {} in {}",
                        overflow_records.len(),
                        chain_length,
                        bucket.overflow_size,
                        bucket.chain_length
                    ),
                ));
            }
            if bucket.has_overflow() && self.trie.can_split(leaf) {
                return Err(corrupt(&node.route, "overflow chain below max depth".to_string()));
            }

            for record in block.records().iter().chain(overflow_records.iter()) {
                let bits: HashBits = self.hash_of(record.key());
                if bits.prefix(node.level) != node.route {
                    return Err(corrupt(
                        &node.route,
                        format!("record {:?} hashes to {}", record.key(), bits),
                    ));
                }
            }

            total += bucket.size();
        }

        if total != self.size {
            return Err(StorageError::Corruption(format!(
                "buckets hold {} records, store size is {}",
                total, self.size
            )));
        }
        Ok(())
    }
}

fn corrupt(route: &str, detail: String) -> StorageError {
    StorageError::Corruption(format!("bucket '{}': {}", route, detail))
}

fn load_trie(path: &Path, max_depth: usize) -> Result<Trie> {
    let bytes = std::fs::read(path.join(TRIE_FILE))?;
    let payload = checksum::unframe(&bytes)?;
    let rows: Vec<LeafRecord> = bincode::deserialize(payload)?;
    Trie::from_dump(&rows, max_depth)
}
