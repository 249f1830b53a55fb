//! dynhash: extendible hash file
//!
//! Records with a fixed-width key live in fixed-size blocks of a main file.
//! A binary trie over the key hash bits maps hash prefixes to buckets; full
//! buckets split until the trie reaches its maximum depth, after which they
//! spill into chained blocks of a separate overflow file. Deletes pull
//! overflow records back and merge sibling buckets, and freed blocks are
//! kept on a free chain or truncated off the end of the file.
//!
//! ## Architecture
//! - Storage layer: block codec, block files with free chain, overflow chains,
//!   metadata and checksummed trie dump
//! - Index layer: arena trie directory
//! - Store: `DynamicHash` (insert/find/edit/delete/contains, save/reopen)
//!
//! ## Example
//! ```no_run
//! use dynhash::{DynamicHash, HashConfig, Item};
//!
//! # fn main() -> dynhash::Result<()> {
//! let mut store: DynamicHash<Item> = DynamicHash::open("data.hash", HashConfig::default())?;
//! store.insert(Item::new(42, "parcel 42"))?;
//! assert_eq!(store.find(&42)?.label, "parcel 42");
//! store.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod storage;
pub mod index;
pub mod types;
pub mod database;

mod error;
mod api;

pub use config::HashConfig;
pub use error::{Result, StorageError};

pub use database::{DynamicHash, HashStats, StoreDescription};
pub use api::HashStore;
pub use types::{DefaultKeyHasher, FnHasher, HashBits, IdentityHasher, Item, KeyHasher, ModuloHasher, Record};
