//! Consumer API
//!
//! Narrow contract for services that index their records through the hash
//! file: point operations, persistence and a diagnostic dump. Callers that
//! only need this surface can hold a `dyn HashStore<R>` instead of naming the
//! hasher type.

use crate::config::HashConfig;
use crate::database::{DynamicHash, StoreDescription};
use crate::types::{KeyHasher, Record};
use crate::Result;

/// Keyed record store
///
/// # Quick start
///
/// ```no_run
/// use dynhash::{DynamicHash, HashConfig, HashStore, Item};
///
/// # fn main() -> dynhash::Result<()> {
/// let mut store: DynamicHash<Item> = DynamicHash::open("parcels.hash", HashConfig::default())?;
/// let store: &mut dyn HashStore<Item> = &mut store;
///
/// store.insert(Item::new(1, "north field"))?;
/// let found = store.find(&1)?;
/// store.edit(&found, Item::new(1, "north meadow"))?;
/// store.save()?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// - `DuplicateKey`, `NotFound`, `KeyMismatch`: ordinary outcomes, the store
///   stays usable
/// - `IncompatibleMetadata`, `FreeChainCorruption`, `Corruption`, `Io`: the
///   instance is unusable afterwards
pub trait HashStore<R: Record> {
    // ============================================================================
    // 1. Point operations
    // ============================================================================

    /// Insert a record whose key is not present yet
    fn insert(&mut self, record: R) -> Result<()>;

    /// Record stored under `key`
    fn find(&self, key: &R::Key) -> Result<R>;

    /// Replace `old` with `new`; both must carry the same key
    fn edit(&mut self, old: &R, new: R) -> Result<()>;

    /// Remove the record stored under `key` and return it
    fn delete(&mut self, key: &R::Key) -> Result<R>;

    /// Whether a record equal to `record` is stored
    fn contains(&self, record: &R) -> Result<bool>;

    // ============================================================================
    // 2. Persistence and diagnostics
    // ============================================================================

    fn save(&mut self) -> Result<()>;

    /// Drop every record and re-create the store with a new geometry
    fn reset(&mut self, config: HashConfig) -> Result<()>;

    fn describe(&self) -> Result<StoreDescription>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R: Record, H: KeyHasher<R::Key>> HashStore<R> for DynamicHash<R, H> {
    fn insert(&mut self, record: R) -> Result<()> {
        DynamicHash::insert(self, record)
    }

    fn find(&self, key: &R::Key) -> Result<R> {
        DynamicHash::find(self, key)
    }

    fn edit(&mut self, old: &R, new: R) -> Result<()> {
        DynamicHash::edit(self, old, new)
    }

    fn delete(&mut self, key: &R::Key) -> Result<R> {
        DynamicHash::delete(self, key)
    }

    fn contains(&self, record: &R) -> Result<bool> {
        DynamicHash::contains(self, record)
    }

    fn save(&mut self) -> Result<()> {
        DynamicHash::save(self)
    }

    fn reset(&mut self, config: HashConfig) -> Result<()> {
        DynamicHash::reset(self, config)
    }

    fn describe(&self) -> Result<StoreDescription> {
        DynamicHash::describe(self)
    }

    fn len(&self) -> usize {
        DynamicHash::len(self)
    }
}
