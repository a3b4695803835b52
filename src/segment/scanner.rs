//! Segment Scanner
//!
//! Sequential iteration over all records in a segment, oldest first.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use bytes::Bytes;

use crate::error::{Result, VaultError};
use crate::record::{Record, RecordHeader, HEADER_SIZE};

use super::SegmentId;

/// Iterator over `(offset, record)` pairs of one segment
///
/// The scan covers the bytes present when it was opened. A record that runs
/// past that end is a torn write from a crash: the scan stops there and
/// reports the offset through [`SegmentScanner::torn_tail`] instead of
/// yielding an error. A short read inside the known length is corruption and
/// is yielded as an error.
pub struct SegmentScanner {
    segment: SegmentId,
    reader: BufReader<File>,
    /// File length when the scan started
    end: u64,
    /// Offset of the next record
    offset: u64,
    torn_tail: Option<u64>,
    done: bool,
}

impl SegmentScanner {
    /// Open a fresh read cursor on the segment file at `path`
    pub(crate) fn open(path: &Path, segment: SegmentId) -> Result<Self> {
        let file = File::open(path)?;
        let end = file.metadata()?.len();

        Ok(Self {
            segment,
            reader: BufReader::new(file),
            end,
            offset: 0,
            torn_tail: None,
            done: false,
        })
    }

    pub fn segment(&self) -> SegmentId {
        self.segment
    }

    /// Offset just past the last record yielded so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Where valid data stops, if the segment ends in a partial record
    pub fn torn_tail(&self) -> Option<u64> {
        self.torn_tail
    }

    fn stop_at_torn_tail(&mut self) -> Option<Result<(u64, Record)>> {
        self.torn_tail = Some(self.offset);
        self.done = true;
        None
    }

    fn fail(&mut self, error: VaultError) -> Option<Result<(u64, Record)>> {
        self.done = true;
        Some(Err(error))
    }
}

impl Iterator for SegmentScanner {
    type Item = Result<(u64, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let offset = self.offset;
        let remaining = self.end - offset;
        if remaining == 0 {
            self.done = true;
            return None;
        }
        if remaining < HEADER_SIZE as u64 {
            return self.stop_at_torn_tail();
        }

        // Read entry header
        let mut header = [0u8; HEADER_SIZE];
        if let Err(e) = self.reader.read_exact(&mut header) {
            let error = match e.kind() {
                io::ErrorKind::UnexpectedEof => VaultError::CorruptHeader { offset },
                _ => VaultError::Io(e),
            };
            return self.fail(error);
        }
        let header = match RecordHeader::decode(&header) {
            Ok(h) => h,
            Err(_) => return self.fail(VaultError::CorruptHeader { offset }),
        };

        let needed = header.record_len();
        if needed > remaining {
            return self.stop_at_torn_tail();
        }

        // Read key and value
        let mut body = vec![0u8; header.body_len() as usize];
        if let Err(e) = self.reader.read_exact(&mut body) {
            let error = match e.kind() {
                io::ErrorKind::UnexpectedEof => VaultError::TruncatedRecord {
                    offset,
                    needed,
                    available: remaining,
                },
                _ => VaultError::Io(e),
            };
            return self.fail(error);
        }

        self.offset += needed;
        Some(Ok((offset, header.into_record(Bytes::from(body)))))
    }
}
