//! Human-readable dumps of the main and overflow files
//!
//! The two traversals only read, so they run side by side on the rayon pool.

use super::core::DynamicHash;
use crate::storage::{Block, BlockFile};
use crate::types::{KeyHasher, Record};
use crate::Result;
use std::fmt::{self, Write as _};

/// Text description of both files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDescription {
    pub main: String,
    pub overflow: String,
}

impl fmt::Display for StoreDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Main file ===")?;
        write!(f, "{}", self.main)?;
        writeln!(f, "=== Overflow file ===")?;
        write!(f, "{}", self.overflow)
    }
}

impl<R: Record, H: KeyHasher<R::Key>> DynamicHash<R, H> {
    /// Dump the directory and every block of both files
    pub fn describe(&self) -> Result<StoreDescription> {
        self.ensure_usable()?;
        let (main, overflow) = rayon::join(
            || self.describe_main(),
            || describe_blocks(self.overflow.blocks()),
        );
        Ok(StoreDescription {
            main: main?,
            overflow: overflow?,
        })
    }

    fn describe_main(&self) -> Result<String> {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Records: {}, buckets: {}, depth: {}/{}",
            self.size,
            self.trie.leaf_count(),
            self.trie.depth(),
            self.trie.max_depth()
        );
        for leaf in self.trie.leaves() {
            let node = self.trie.node(leaf);
            let bucket = self.trie.bucket(leaf)?;
            let _ = writeln!(
                out,
                "Bucket '{}' (level {}): block {}, main {}, overflow {}, chain {}",
                node.route,
                node.level,
                bucket.block_address,
                bucket.main_size,
                bucket.overflow_size,
                bucket.chain_length
            );
        }
        out.push_str(&describe_blocks(&self.main)?);
        Ok(out)
    }
}

/// Every block in address order, then the free chain
fn describe_blocks<R: Record>(file: &BlockFile<R>) -> Result<String> {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}: {} blocks of {} bytes, first empty {}",
        file.path().display(),
        file.block_count(),
        file.block_size(),
        file.first_empty()
    );

    let mut address = 0;
    while address < file.len() {
        let block = file.read_block(address)?;
        write_block(&mut out, &block);
        address += file.block_size();
    }

    let _ = writeln!(out, "Free chain: {:?}", file.free_chain()?);
    Ok(out)
}

fn write_block<R: Record>(out: &mut String, block: &Block<R>) {
    let link = |addr: Option<u64>| addr.map_or_else(|| "-".to_string(), |a| a.to_string());
    let _ = writeln!(
        out,
        "  [{}] valid {}/{}, previous {}, next {}",
        block.address,
        block.len(),
        block.block_factor(),
        link(block.previous),
        link(block.next)
    );
    for record in block.records() {
        let _ = writeln!(out, "    {:?}", record);
    }
}
