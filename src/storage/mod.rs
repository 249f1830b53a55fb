//! Storage layer implementation
//!
//! Fixed-size blocks in random-access files: block codec, free-space
//! management, overflow chains and persisted metadata.

pub mod block;
pub mod block_file;
pub mod overflow;
pub mod metadata;
pub mod checksum;

pub use block::{Block, BLOCK_HEADER_SIZE};
pub use block_file::BlockFile;
pub use overflow::{AppendOutcome, OverflowStore, Removal, TailTake};
pub use metadata::{HashMetadata, OverflowMetadata, METADATA_VERSION};
