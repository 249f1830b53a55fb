//! Persisted metadata for the main and overflow files
//!
//! ## Files
//! - `main_meta.json`: block geometry of the main file, free-chain head,
//!   record count, trie max depth and the overflow block factor
//! - `overflow_meta.json`: block geometry and free-chain head of the
//!   overflow file
//!
//! Both are pretty JSON so a store can be inspected with a text editor.
//!
//! ## Compatibility
//! A store is opened only with the geometry it was written with. Any
//! difference in block factor, block size, max depth, overflow block factor
//! or format version is reported as [`StorageError::IncompatibleMetadata`]
//! before a single block is touched.
//!
//! ## Atomic writes
//! Temp file, fsync, rename over the target, fsync the directory. A crash
//! leaves either the previous or the new metadata, never a torn file.
//!
//! ## Usage
//! ```ignore
//! metadata::write_atomic(&dir.join("main_meta.json"), &meta)?;
//!
//! let meta: HashMetadata = metadata::read(&dir.join("main_meta.json"))?;
//! meta.check_compatible(6, Block::<Item>::size_for(6), 5, 10)?;
//! ```

use crate::{Result, StorageError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Current metadata format version
pub const METADATA_VERSION: u32 = 1;

/// Main file metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashMetadata {
    pub version: u32,
    pub block_factor: usize,
    pub first_empty_block: u64,
    pub block_size: usize,
    /// Number of stored records
    pub size: usize,
    pub trie_max_depth: usize,
    pub overflow_block_factor: usize,
}

/// Overflow file metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverflowMetadata {
    pub block_factor: usize,
    pub first_empty_block: u64,
    pub block_size: usize,
}

impl HashMetadata {
    /// Fail with `IncompatibleMetadata` unless the persisted layout matches
    /// the live configuration.
    pub fn check_compatible(
        &self,
        block_factor: usize,
        block_size: usize,
        max_depth: usize,
        overflow_block_factor: usize,
    ) -> Result<()> {
        if self.version != METADATA_VERSION {
            return Err(StorageError::IncompatibleMetadata(format!(
                "unsupported metadata version {} (expected {})",
                self.version, METADATA_VERSION
            )));
        }

        let checks = [
            ("block_factor", self.block_factor, block_factor),
            ("block_size", self.block_size, block_size),
            ("trie_max_depth", self.trie_max_depth, max_depth),
            ("overflow_block_factor", self.overflow_block_factor, overflow_block_factor),
        ];
        for (field, persisted, live) in checks {
            if persisted != live {
                return Err(StorageError::IncompatibleMetadata(format!(
                    "{}: persisted {} but configured {}",
                    field, persisted, live
                )));
            }
        }
        Ok(())
    }
}

impl OverflowMetadata {
    pub fn check_compatible(&self, block_factor: usize, block_size: usize) -> Result<()> {
        if self.block_factor != block_factor || self.block_size != block_size {
            return Err(StorageError::IncompatibleMetadata(format!(
                "overflow file: persisted block factor {} / size {} but configured {} / {}",
                self.block_factor, self.block_size, block_factor, block_size
            )));
        }
        Ok(())
    }
}

/// Read a metadata file
pub fn read<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

/// Atomically replace `path` with the JSON encoding of `value`
pub fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_bytes_atomic(path, &json)
}

/// Atomically replace `path` with `bytes`
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&temp_path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(bytes)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    drop(writer);

    std::fs::rename(&temp_path, path)?;
    sync_parent_dir(path)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    use std::os::unix::io::AsRawFd;

    let Some(dir) = path.parent() else {
        return Ok(());
    };
    let dir = File::open(dir)?;
    // SAFETY: the descriptor stays open for the duration of the call
    let rc = unsafe { libc::fsync(dir.as_raw_fd()) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(path: &Path) -> Result<()> {
    // Best effort: sync the renamed file itself
    File::open(path)?.sync_all()?;
    Ok(())
}
