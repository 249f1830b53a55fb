//! Hash Store Module
//!
//! # Module Structure
//! - `core`: DynamicHash struct, open, accessors and stats
//! - `crud`: insert, find, edit, delete, contains, scan
//! - `restructure`: bucket split, overflow pull-back, sibling merge, empty reset
//! - `persistence`: save/close, reopen, reset to a new geometry and
//!   consistency verification
//! - `describe`: readable dumps of both block files

pub mod core;
pub mod crud;
pub mod restructure;
pub mod persistence;
pub mod describe;

#[cfg(test)]
mod tests;

// Re-export main types
pub use core::{DynamicHash, HashStats};
pub use describe::StoreDescription;
