//! Record codec
//!
//! Encoding and decoding of single records. Error offsets are relative to
//! the start of the buffer handed to `decode`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, VaultError};

use super::{Entry, Record};

/// Fixed header: timestamp (8) + key_len (4) + value_len (4)
pub const HEADER_SIZE: usize = 16;

/// The fixed-size prefix of every record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub timestamp: u64,
    pub key_len: u32,
    pub value_len: u32,
}

impl RecordHeader {
    /// Parse a header from the first `HEADER_SIZE` bytes of `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(VaultError::CorruptHeader { offset: 0 });
        }

        let mut buf = &bytes[..HEADER_SIZE];
        Ok(Self {
            timestamp: buf.get_u64(),
            key_len: buf.get_u32(),
            value_len: buf.get_u32(),
        })
    }

    /// Key plus value length
    pub fn body_len(&self) -> u64 {
        self.key_len as u64 + self.value_len as u64
    }

    /// Header plus body length
    pub fn record_len(&self) -> u64 {
        HEADER_SIZE as u64 + self.body_len()
    }

    pub fn is_tombstone(&self) -> bool {
        self.value_len == 0
    }

    /// Assemble a record from this header and its body bytes (key then value).
    /// `body` must be exactly `body_len()` bytes.
    pub(crate) fn into_record(self, mut body: Bytes) -> Record {
        debug_assert_eq!(body.len() as u64, self.body_len());

        let key = body.split_to(self.key_len as usize);
        let entry = if self.is_tombstone() {
            Entry::Tombstone
        } else {
            Entry::Value(body)
        };

        Record {
            timestamp: self.timestamp,
            key,
            entry,
        }
    }
}

/// Encode a record to bytes
///
/// Lengths must already fit in `u32` (see `Record::validate`).
pub fn encode(record: &Record) -> Bytes {
    let value: &[u8] = match &record.entry {
        Entry::Value(v) => v,
        Entry::Tombstone => &[],
    };

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + record.key.len() + value.len());
    buf.put_u64(record.timestamp);
    buf.put_u32(record.key.len() as u32);
    buf.put_u32(value.len() as u32);
    buf.put_slice(&record.key);
    buf.put_slice(value);

    buf.freeze()
}

/// Decode one record from the front of `bytes`
///
/// Returns the record and the number of bytes consumed.
pub fn decode(bytes: &[u8]) -> Result<(Record, usize)> {
    let header = RecordHeader::decode(bytes)?;

    let needed = header.record_len();
    let available = bytes.len() as u64;
    if available < needed {
        return Err(VaultError::TruncatedRecord {
            offset: 0,
            needed,
            available,
        });
    }

    let consumed = needed as usize;
    let body = Bytes::copy_from_slice(&bytes[HEADER_SIZE..consumed]);
    Ok((header.into_record(body), consumed))
}
