//! Hash Store Core - DynamicHash structure and initialization
//!
//! This module contains:
//! - DynamicHash struct definition
//! - open() / open_with_hasher() for fresh and existing directories
//! - Accessors, statistics and the fatal-error guard
//!
//! ## Open
//! `open()` looks for `main_meta.json` in the store directory. Without it a
//! fresh store is created: a two-block main file, an empty overflow file
//! and a trie with two empty level-1 leaves. With it the saved store is
//! validated against the given [`HashConfig`] and loaded.
//!
//! ## Fatal errors
//! `Io`, `IncompatibleMetadata`, `FreeChainCorruption` and `Corruption`
//! leave the files in an unknown state. The instance records that and
//! answers every later call with `Corruption` until it is reset or dropped.
//!
//! ## Usage
//! ```ignore
//! let mut store = DynamicHash::<Item>::open("data.hash", HashConfig::compact())?;
//! store.insert(Item::new(1, "one"))?;
//!
//! let stats = store.stats()?;
//! println!("{} records in {} buckets", stats.size, stats.leaf_count);
//! ```

use crate::config::HashConfig;
use crate::index::{Bucket, Lookup, Trie};
use crate::storage::{BlockFile, OverflowStore};
use crate::types::{DefaultKeyHasher, HashBits, KeyHasher, Record};
use crate::{Result, StorageError};
use std::hash::Hash;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Main block file
pub(crate) const MAIN_FILE: &str = "main.bin";
/// Overflow block file
pub(crate) const OVERFLOW_FILE: &str = "overflow.bin";
/// Main metadata, its presence marks an existing store
pub(crate) const MAIN_META: &str = "main_meta.json";
pub(crate) const OVERFLOW_META: &str = "overflow_meta.json";
/// Checksummed leaf dump of the trie
pub(crate) const TRIE_FILE: &str = "trie.bin";

/// Blocks the main file always keeps (one per level-1 leaf)
pub(crate) const MAIN_MIN_BLOCKS: u64 = 2;

/// Store statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashStats {
    pub size: usize,
    pub depth: usize,
    pub leaf_count: usize,
    pub main_blocks: u64,
    pub main_free_blocks: usize,
    pub overflow_blocks: u64,
    pub overflow_free_blocks: usize,
    pub main_file_len: u64,
    pub overflow_file_len: u64,
}

/// Extendible hash file: trie directory over a main block file plus an
/// overflow block file.
///
/// Single owner, single thread: every operation does its file I/O inline.
pub struct DynamicHash<R: Record, H = DefaultKeyHasher> {
    /// Store directory
    pub(crate) path: PathBuf,

    pub(crate) config: HashConfig,

    /// Main buckets
    pub(crate) main: BlockFile<R>,

    /// Overflow chains of buckets at max depth
    pub(crate) overflow: OverflowStore<R>,

    /// Bucket directory
    pub(crate) trie: Trie,

    pub(crate) hasher: H,

    /// Number of stored records
    pub(crate) size: usize,

    /// Set after a fatal error; the instance refuses further work
    pub(crate) poisoned: bool,
}

impl<R: Record> DynamicHash<R, DefaultKeyHasher>
where
    R::Key: Hash,
{
    /// Open the store in `path` with the default key hasher, creating it if
    /// the directory holds no store yet.
    pub fn open(path: impl AsRef<Path>, config: HashConfig) -> Result<Self> {
        Self::open_with_hasher(path, config, DefaultKeyHasher::default())
    }
}

impl<R: Record, H: KeyHasher<R::Key>> DynamicHash<R, H> {
    /// Open the store in `path` with a custom key hasher.
    ///
    /// An existing store is validated against `config`; a layout mismatch
    /// fails with [`StorageError::IncompatibleMetadata`] and leaves the files
    /// untouched.
    pub fn open_with_hasher(path: impl AsRef<Path>, config: HashConfig, hasher: H) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;

        if path.join(MAIN_META).exists() {
            Self::reopen(path, config, hasher)
        } else {
            Self::create(path, config, hasher)
        }
    }

    /// Fresh store: two level-1 leaves over a two-block main file
    fn create(path: PathBuf, config: HashConfig, hasher: H) -> Result<Self> {
        let main = BlockFile::create(path.join(MAIN_FILE), config.block_factor, MAIN_MIN_BLOCKS)?;
        let overflow =
            OverflowStore::create(path.join(OVERFLOW_FILE), config.overflow_block_factor)?;
        let trie = Trie::new(0, main.block_size(), config.max_depth)?;

        info!(
            "Created hash store at {} (block factor {}, overflow block factor {}, max depth {})",
            path.display(),
            config.block_factor,
            config.overflow_block_factor,
            config.max_depth
        );

        Ok(Self {
            path,
            config,
            main,
            overflow,
            trie,
            hasher,
            size: 0,
            poisoned: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &HashConfig {
        &self.config
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Deepest leaf level of the directory
    pub fn depth(&self) -> usize {
        self.trie.depth()
    }

    /// Read-only view of the directory
    pub fn trie(&self) -> &Trie {
        &self.trie
    }

    /// Hash bits of `key`
    pub fn hash_of(&self, key: &R::Key) -> HashBits {
        self.hasher.hash_bits(key)
    }

    /// Bucket that `key` routes to, if its leaf exists
    pub fn bucket_of(&self, key: &R::Key) -> Option<Bucket> {
        match self.trie.lookup(self.hash_of(key)) {
            Lookup::Leaf(id) => self.trie.bucket(id).ok().copied(),
            Lookup::Vacant { .. } => None,
        }
    }

    /// Whether a fatal error has made this instance unusable
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn stats(&self) -> Result<HashStats> {
        self.ensure_usable()?;
        Ok(HashStats {
            size: self.size,
            depth: self.trie.depth(),
            leaf_count: self.trie.leaf_count(),
            main_blocks: self.main.block_count(),
            main_free_blocks: self.main.free_chain()?.len(),
            overflow_blocks: self.overflow.blocks().block_count(),
            overflow_free_blocks: self.overflow.blocks().free_chain()?.len(),
            main_file_len: self.main.len(),
            overflow_file_len: self.overflow.blocks().len(),
        })
    }

    pub(crate) fn ensure_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(StorageError::Corruption(format!(
                "hash store at {} hit a fatal error earlier and must be reopened",
                self.path.display()
            )));
        }
        Ok(())
    }

    /// Poison the instance if `result` carries a fatal error
    pub(crate) fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_fatal() && !self.poisoned {
                error!("Hash store at {} poisoned: {}", self.path.display(), err);
                self.poisoned = true;
            }
        }
        result
    }
}
