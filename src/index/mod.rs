//! Directory structures
//!
//! - Trie: binary trie over key hash bits, one leaf per bucket

pub mod trie;

pub use trie::{Bucket, LeafRecord, Lookup, NodeId, NodeKind, Trie, TrieNode};
