//! Block File Manager
//!
//! Maps block addresses to a flat file of `block_size`-byte blocks and keeps
//! unused blocks on a doubly-linked free chain threaded through the block
//! headers (`next`/`previous`).
//!
//! ## Free space rules
//! - `first_empty()` is the head of the free chain, or the file length when
//!   the chain is empty
//! - Allocating with an empty chain grows the file by one block
//! - Releasing the last block truncates the file instead of chaining it,
//!   then keeps truncating while the new last block is also free
//! - The file never shrinks below `min_blocks` blocks
//!
//! Any chain invariant found broken while allocating or walking is reported
//! as [`StorageError::FreeChainCorruption`].

use super::block::Block;
use crate::types::Record;
use crate::{Result, StorageError};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Random-access file of fixed-size blocks
pub struct BlockFile<R: Record> {
    /// Storage path
    path: PathBuf,

    /// File handle, locked so read-only traversals can run through `&self`
    file: Mutex<File>,

    block_factor: usize,
    block_size: u64,

    /// Current file length in bytes (always a multiple of `block_size`)
    len: u64,

    /// Head of the free chain
    free_head: Option<u64>,

    /// Blocks the file keeps even when they are empty
    min_blocks: u64,

    _record: PhantomData<fn() -> R>,
}

impl<R: Record> BlockFile<R> {
    /// Create (or truncate) a block file holding `min_blocks` empty blocks
    pub fn create(path: impl AsRef<Path>, block_factor: usize, min_blocks: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let mut block_file = Self::with_file(path, file, block_factor, min_blocks, 0, None);
        block_file.reset()?;
        Ok(block_file)
    }

    /// Open an existing block file whose free chain starts at `first_empty`
    pub fn open(
        path: impl AsRef<Path>,
        block_factor: usize,
        min_blocks: u64,
        first_empty: u64,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(StorageError::Corruption(format!(
                "Block file missing: {}",
                path.display()
            )));
        }

        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        let block_size = Block::<R>::size_for(block_factor) as u64;

        if len % block_size != 0 {
            return Err(StorageError::Corruption(format!(
                "{}: length {} is not a multiple of block size {}",
                path.display(),
                len,
                block_size
            )));
        }
        if first_empty > len || first_empty % block_size != 0 {
            return Err(StorageError::FreeChainCorruption(format!(
                "{}: first empty block {} outside file of length {}",
                path.display(),
                first_empty,
                len
            )));
        }

        let free_head = if first_empty == len { None } else { Some(first_empty) };
        Ok(Self::with_file(path, file, block_factor, min_blocks, len, free_head))
    }

    fn with_file(
        path: PathBuf,
        file: File,
        block_factor: usize,
        min_blocks: u64,
        len: u64,
        free_head: Option<u64>,
    ) -> Self {
        Self {
            path,
            file: Mutex::new(file),
            block_factor,
            block_size: Block::<R>::size_for(block_factor) as u64,
            len,
            free_head,
            min_blocks,
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn block_factor(&self) -> usize {
        self.block_factor
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// File length in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn block_count(&self) -> u64 {
        self.len / self.block_size
    }

    /// Head of the free chain, or the file length when the chain is empty
    pub fn first_empty(&self) -> u64 {
        self.free_head.unwrap_or(self.len)
    }

    /// Truncate to `min_blocks` empty blocks and forget the free chain
    pub fn reset(&mut self) -> Result<()> {
        let len = self.min_blocks * self.block_size;
        self.file.lock().set_len(len)?;
        self.len = len;
        self.free_head = None;
        for i in 0..self.min_blocks {
            self.write_block(&Block::new(self.block_factor, i * self.block_size))?;
        }
        Ok(())
    }

    /// Read the block at `address`
    pub fn read_block(&self, address: u64) -> Result<Block<R>> {
        self.check_address(address)?;

        let mut buf = vec![0u8; self.block_size as usize];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(address))?;
            file.read_exact(&mut buf)?;
        }

        Block::decode(self.block_factor, address, &buf)
    }

    /// Write `block` at its address
    pub fn write_block(&self, block: &Block<R>) -> Result<()> {
        self.check_address(block.address)?;
        if block.block_factor() != self.block_factor {
            return Err(StorageError::InvalidArgument(format!(
                "Block factor {} does not match file block factor {}",
                block.block_factor(),
                self.block_factor
            )));
        }

        let buf = block.encode();
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(block.address))?;
        file.write_all(&buf)?;
        Ok(())
    }

    /// Hand out an empty block, reusing the free chain head when there is one
    pub fn allocate(&mut self) -> Result<Block<R>> {
        let head = match self.free_head {
            Some(head) => head,
            None => {
                // End of file: grow by one block
                let address = self.len;
                self.len += self.block_size;
                self.file.lock().set_len(self.len)?;
                let block = Block::new(self.block_factor, address);
                self.write_block(&block)?;
                return Ok(block);
            }
        };

        let mut block = self.read_block(head)?;

        if !block.is_empty() {
            return Err(StorageError::FreeChainCorruption(format!(
                "{}: free block {} holds {} records",
                self.path.display(),
                head,
                block.len()
            )));
        }
        if let Some(prev) = block.previous {
            return Err(StorageError::FreeChainCorruption(format!(
                "{}: chain head {} has predecessor {}",
                self.path.display(),
                head,
                prev
            )));
        }
        if block.next == Some(head) {
            return Err(StorageError::FreeChainCorruption(format!(
                "{}: free block {} links to itself",
                self.path.display(),
                head
            )));
        }

        if let Some(next) = block.next {
            let mut successor = self.read_block(next)?;
            if successor.previous != Some(head) {
                return Err(StorageError::FreeChainCorruption(format!(
                    "{}: block {} follows {} but points back to {:?}",
                    self.path.display(),
                    next,
                    head,
                    successor.previous
                )));
            }
            successor.previous = None;
            self.write_block(&successor)?;
        }

        self.free_head = block.next;
        block.clear();
        self.write_block(&block)?;
        Ok(block)
    }

    /// Return `block` to free space
    pub fn release(&mut self, mut block: Block<R>) -> Result<()> {
        let address = block.address;
        self.check_address(address)?;
        if self.free_head == Some(address) {
            return Err(StorageError::FreeChainCorruption(format!(
                "{}: block {} released twice",
                self.path.display(),
                address
            )));
        }

        block.clear();

        if address + self.block_size == self.len && self.len > self.min_blocks * self.block_size {
            self.len -= self.block_size;
            self.file.lock().set_len(self.len)?;
            return self.trim_free_tail();
        }

        if let Some(head) = self.free_head {
            let mut old_head = self.read_block(head)?;
            old_head.previous = Some(address);
            self.write_block(&old_head)?;
            block.next = Some(head);
        }

        self.write_block(&block)?;
        self.free_head = Some(address);
        Ok(())
    }

    /// Addresses on the free chain, head first
    pub fn free_chain(&self) -> Result<Vec<u64>> {
        let mut chain = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut expected_prev = None;
        let mut cursor = self.free_head;

        while let Some(address) = cursor {
            if !seen.insert(address) {
                return Err(StorageError::FreeChainCorruption(format!(
                    "{}: block {} appears twice in the free chain",
                    self.path.display(),
                    address
                )));
            }

            let block = self.read_block(address)?;
            if block.next == Some(address) || block.previous == Some(address) {
                return Err(StorageError::FreeChainCorruption(format!(
                    "{}: free block {} links to itself",
                    self.path.display(),
                    address
                )));
            }
            if block.previous != expected_prev {
                return Err(StorageError::FreeChainCorruption(format!(
                    "{}: free block {} has predecessor {:?}, expected {:?}",
                    self.path.display(),
                    address,
                    block.previous,
                    expected_prev
                )));
            }
            if !block.is_empty() {
                return Err(StorageError::FreeChainCorruption(format!(
                    "{}: free block {} holds {} records",
                    self.path.display(),
                    address,
                    block.len()
                )));
            }

            chain.push(address);
            expected_prev = Some(address);
            cursor = block.next;
        }

        Ok(chain)
    }

    /// fsync data to disk
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    /// Truncate free blocks off the end of the file
    fn trim_free_tail(&mut self) -> Result<()> {
        while self.len > self.min_blocks * self.block_size {
            let last = self.read_block(self.len - self.block_size)?;
            if !self.is_free(&last) {
                break;
            }
            self.unlink(&last)?;
            self.len -= self.block_size;
            self.file.lock().set_len(self.len)?;
        }
        Ok(())
    }

    /// In-use blocks never carry a predecessor, so an empty block is free
    /// exactly when it has one or heads the chain.
    fn is_free(&self, block: &Block<R>) -> bool {
        block.is_empty() && (block.previous.is_some() || self.free_head == Some(block.address))
    }

    /// Splice a free block out of the chain
    fn unlink(&mut self, block: &Block<R>) -> Result<()> {
        match block.previous {
            Some(prev) => {
                let mut pred = self.read_block(prev)?;
                pred.next = block.next;
                self.write_block(&pred)?;
            }
            None => self.free_head = block.next,
        }

        if let Some(next) = block.next {
            let mut succ = self.read_block(next)?;
            succ.previous = block.previous;
            self.write_block(&succ)?;
        }
        Ok(())
    }

    fn check_address(&self, address: u64) -> Result<()> {
        if address % self.block_size != 0 || address + self.block_size > self.len {
            return Err(StorageError::Corruption(format!(
                "{}: invalid block address {} (block size {}, file length {})",
                self.path.display(),
                address,
                self.block_size,
                self.len
            )));
        }
        Ok(())
    }
}
