//! Record Module
//!
//! The atomic unit of storage: one timestamped write of a key.
//!
//! ## Format
//! ```text
//! ┌───────────────┬─────────────┬───────────────┬───────┬─────────┐
//! │ Timestamp (8) │ KeyLen (4)  │ ValueLen (4)  │  Key  │  Value  │
//! └───────────────┴─────────────┴───────────────┴───────┴─────────┘
//! ```
//! All integers are big-endian. `ValueLen == 0` marks a tombstone.
//! Records carry their own lengths, so a segment can be scanned front to
//! back without any external index. There is no checksum.

mod codec;

use bytes::Bytes;

use crate::error::{Result, VaultError};

pub use codec::{decode, encode, RecordHeader, HEADER_SIZE};

/// Payload carried by a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A live value
    Value(Bytes),

    /// A tombstone (deleted key)
    Tombstone,
}

/// A single timestamped write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Write time, nanoseconds since the Unix epoch
    pub timestamp: u64,

    /// The key written
    pub key: Bytes,

    /// The value, or a tombstone
    pub entry: Entry,
}

impl Record {
    /// Build a put record. An empty value is stored as a tombstone, since the
    /// format cannot tell the two apart.
    pub fn put(timestamp: u64, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        let value = value.into();
        let entry = if value.is_empty() {
            Entry::Tombstone
        } else {
            Entry::Value(value)
        };
        Self {
            timestamp,
            key: key.into(),
            entry,
        }
    }

    /// Build a tombstone record
    pub fn tombstone(timestamp: u64, key: impl Into<Bytes>) -> Self {
        Self {
            timestamp,
            key: key.into(),
            entry: Entry::Tombstone,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self.entry, Entry::Tombstone)
    }

    /// The live value, `None` for a tombstone
    pub fn value(&self) -> Option<&Bytes> {
        match &self.entry {
            Entry::Value(v) => Some(v),
            Entry::Tombstone => None,
        }
    }

    pub fn into_value(self) -> Option<Bytes> {
        match self.entry {
            Entry::Value(v) => Some(v),
            Entry::Tombstone => None,
        }
    }

    /// Bytes of value stored on disk (0 for a tombstone)
    pub fn value_len(&self) -> usize {
        self.value().map_or(0, |v| v.len())
    }

    /// Total size of the encoded record
    pub fn encoded_len(&self) -> u64 {
        (HEADER_SIZE + self.key.len() + self.value_len()) as u64
    }

    /// Check that key and value fit their 32-bit length fields
    pub fn validate(&self) -> Result<()> {
        check_len("key", self.key.len())?;
        check_len("value", self.value_len())
    }
}

fn check_len(field: &'static str, len: usize) -> Result<()> {
    if u32::try_from(len).is_err() {
        return Err(VaultError::RecordTooLarge { field, len });
    }
    Ok(())
}
