//! Error types for the dynhash storage engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Lookup / mutation outcomes the caller is expected to handle
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Key mismatch: {0}")]
    KeyMismatch(String),

    #[error("Block full: capacity {capacity}")]
    BlockFull { capacity: usize },

    #[error("Capacity exhausted: {0}")]
    CapacityExhausted(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Structural errors, the store instance must not be used afterwards
    #[error("Incompatible metadata: {0}")]
    IncompatibleMetadata(String),

    #[error("Free chain corruption: {0}")]
    FreeChainCorruption(String),

    #[error("Data corruption: {0}")]
    Corruption(String),
}

impl StorageError {
    /// Whether this error leaves the files in a state that must not be
    /// touched again through the same store instance.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StorageError::Io(_)
                | StorageError::IncompatibleMetadata(_)
                | StorageError::FreeChainCorruption(_)
                | StorageError::Corruption(_)
        )
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
