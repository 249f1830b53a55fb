//! Hash file configuration
//!
//! Block geometry and directory depth are part of the on-disk layout: a store
//! reopened with a configuration that disagrees with its persisted metadata
//! is rejected instead of being reinterpreted.

use crate::{Result, StorageError};
use serde::{Deserialize, Serialize};

/// Widest hash prefix the trie can consume (bits in [`HashBits`](crate::types::HashBits)).
pub const MAX_TRIE_DEPTH: usize = 64;

/// Configuration of a [`DynamicHash`](crate::DynamicHash) store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashConfig {
    /// Records per main-file block
    pub block_factor: usize,

    /// Records per overflow-file block (0 disables overflow chains)
    pub overflow_block_factor: usize,

    /// Maximum trie depth; buckets at this level overflow instead of splitting
    pub max_depth: usize,

    /// fsync both block files on every `save()`
    pub sync_on_save: bool,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            block_factor: 6,
            overflow_block_factor: 10,
            max_depth: 5,
            sync_on_save: true,
        }
    }
}

impl HashConfig {
    /// Create a configuration with explicit geometry
    pub fn new(block_factor: usize, overflow_block_factor: usize, max_depth: usize) -> Self {
        Self {
            block_factor,
            overflow_block_factor,
            max_depth,
            ..Default::default()
        }
    }

    /// Small blocks and a shallow directory, exercises splits and overflow quickly
    pub fn compact() -> Self {
        Self::new(2, 2, 4)
    }

    /// Deep directory with large buckets, overflow is rare
    pub fn wide() -> Self {
        Self::new(32, 16, 24)
    }

    /// Skip fsync on save (tests and benchmarks)
    pub fn without_sync(mut self) -> Self {
        self.sync_on_save = false;
        self
    }

    /// Reject geometries the store cannot represent
    pub fn validate(&self) -> Result<()> {
        if self.block_factor == 0 {
            return Err(StorageError::InvalidArgument(
                "block_factor must be at least 1".into(),
            ));
        }
        if self.max_depth == 0 || self.max_depth > MAX_TRIE_DEPTH {
            return Err(StorageError::InvalidArgument(format!(
                "max_depth must be within 1..={}, got {}",
                MAX_TRIE_DEPTH, self.max_depth
            )));
        }
        if self.block_factor > i32::MAX as usize || self.overflow_block_factor > i32::MAX as usize {
            return Err(StorageError::InvalidArgument(
                "block factor does not fit the block header".into(),
            ));
        }
        Ok(())
    }

    /// Whether full buckets at `max_depth` may spill into overflow chains
    pub fn overflow_enabled(&self) -> bool {
        self.overflow_block_factor > 0
    }
}
