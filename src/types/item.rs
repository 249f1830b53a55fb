//! Sample record: numeric id plus a short label
//!
//! Used by the CLI, the benchmarks and the tests; external services bring
//! their own [`Record`] implementations.

use super::fixed_str;
use super::record::Record;
use crate::Result;

/// `u64` key with a label of at most [`Item::LABEL_LEN`] bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: u64,
    pub label: String,
}

impl Item {
    pub const LABEL_LEN: usize = 20;

    /// Labels longer than `LABEL_LEN` bytes are truncated
    pub fn new(id: u64, label: impl Into<String>) -> Self {
        let label = label.into();
        let label = fixed_str::truncate_to(&label, Self::LABEL_LEN).to_string();
        Self { id, label }
    }
}

impl Record for Item {
    type Key = u64;

    const SIZE: usize = 8 + fixed_str::encoded_len(Self::LABEL_LEN);

    fn key(&self) -> &u64 {
        &self.id
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.id.to_le_bytes());
        fixed_str::encode(&self.label, Self::LABEL_LEN, &mut buf[8..Self::SIZE]);
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let mut id = [0u8; 8];
        id.copy_from_slice(&buf[..8]);
        Ok(Self {
            id: u64::from_le_bytes(id),
            label: fixed_str::decode(&buf[8..Self::SIZE], Self::LABEL_LEN)?,
        })
    }
}
