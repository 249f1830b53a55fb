//! Record contract, sample record and key hashing

pub mod record;
pub mod hash;
pub mod fixed_str;
pub mod item;

pub use record::Record;
pub use hash::{DefaultKeyHasher, FnHasher, HashBits, IdentityHasher, KeyHasher, ModuloHasher};
pub use item::Item;
