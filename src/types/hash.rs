//! Key hashing into the bit sequence that drives the trie directory
//!
//! Bit `i` of [`HashBits`] selects the child at depth `i` (0 = left,
//! 1 = right). Bits are numbered from the least significant end, so a key
//! hashing to `...101` goes right at depth 0, left at depth 1, right at
//! depth 2.
//!
//! ## Hashers
//! - [`DefaultKeyHasher`]: aHash with fixed seeds, for any `K: Hash`
//! - [`IdentityHasher`]: the `u64` key is its own hash
//! - [`ModuloHasher`]: `key % modulus`, crowds keys into few buckets
//! - [`FnHasher`]: any `Fn(&K) -> HashBits` closure
//!
//! The persisted directory is only valid for the hasher that built it.
//! Reopening a store with a different hasher routes keys to the wrong
//! buckets.
//!
//! ## Usage
//! ```ignore
//! let bits = DefaultKeyHasher::default().hash_bits(&42u64);
//! let route = bits.prefix(3); // e.g. "101"
//!
//! let store = DynamicHash::<Item, _>::open_with_hasher(
//!     "data.hash",
//!     HashConfig::default(),
//!     FnHasher(|key: &u64| HashBits::new(key.rotate_left(7))),
//! )?;
//! ```

use std::fmt;
use std::hash::Hash;

/// 64-bit hash value addressed bit by bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashBits(u64);

impl HashBits {
    /// Number of addressable bits
    pub const WIDTH: usize = 64;

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Bit at `index`; bits past the width read as 0
    #[inline]
    pub fn bit(&self, index: usize) -> bool {
        index < Self::WIDTH && (self.0 >> index) & 1 == 1
    }

    /// The first `len` bits as a route string ("0"/"1" per level)
    pub fn prefix(&self, len: usize) -> String {
        (0..len.min(Self::WIDTH))
            .map(|i| if self.bit(i) { '1' } else { '0' })
            .collect()
    }
}

impl fmt::Display for HashBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Route order: depth 0 first
        write!(f, "{}", self.prefix(Self::WIDTH))
    }
}

/// Maps keys to [`HashBits`]
pub trait KeyHasher<K: ?Sized>: Send + Sync {
    fn hash_bits(&self, key: &K) -> HashBits;
}

/// Default hasher: aHash with fixed seeds.
///
/// Seeds are constant so the same key hashes to the same bits across
/// process restarts; the persisted directory depends on that.
#[derive(Clone)]
pub struct DefaultKeyHasher {
    state: ahash::RandomState,
}

const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

impl Default for DefaultKeyHasher {
    fn default() -> Self {
        Self {
            state: ahash::RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]),
        }
    }
}

impl<K: Hash + ?Sized> KeyHasher<K> for DefaultKeyHasher {
    fn hash_bits(&self, key: &K) -> HashBits {
        HashBits(self.state.hash_one(key))
    }
}

/// Uses the integer key itself as the hash; handy when tests need to pick
/// exact bit patterns.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityHasher;

impl KeyHasher<u64> for IdentityHasher {
    fn hash_bits(&self, key: &u64) -> HashBits {
        HashBits(*key)
    }
}

/// `key % modulus`, concentrates keys into few buckets
#[derive(Debug, Clone, Copy)]
pub struct ModuloHasher {
    modulus: u64,
}

impl ModuloHasher {
    pub fn new(modulus: u64) -> Self {
        Self { modulus: modulus.max(1) }
    }
}

impl Default for ModuloHasher {
    fn default() -> Self {
        Self::new(50)
    }
}

impl KeyHasher<u64> for ModuloHasher {
    fn hash_bits(&self, key: &u64) -> HashBits {
        HashBits(key % self.modulus)
    }
}

/// Adapter for closures
pub struct FnHasher<F>(pub F);

impl<K: ?Sized, F> KeyHasher<K> for FnHasher<F>
where
    F: Fn(&K) -> HashBits + Send + Sync,
{
    fn hash_bits(&self, key: &K) -> HashBits {
        (self.0)(key)
    }
}
