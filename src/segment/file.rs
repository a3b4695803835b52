//! Segment file
//!
//! One open file handle per segment. Appends go through the handle opened in
//! append mode; reads use positional I/O so any number of readers can share
//! the handle without seeking.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{Result, VaultError};
use crate::record::{self, Record, RecordHeader, HEADER_SIZE};

use super::{SegmentId, SegmentScanner, SegmentState};

/// An append-only file of records
pub struct Segment {
    id: SegmentId,
    /// Current location on disk (changes when sealed)
    path: Mutex<PathBuf>,
    file: File,
    /// Bytes of complete records; readers never look past this
    size: AtomicU64,
    created_at: SystemTime,
    /// Held across appends so a seal can never interleave with a write
    state: Mutex<SegmentState>,
}

impl Segment {
    /// Create a new, empty Active segment at `path`
    pub fn create(path: &Path, id: SegmentId) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            id,
            path: Mutex::new(path.to_path_buf()),
            file,
            size: AtomicU64::new(0),
            created_at: SystemTime::now(),
            state: Mutex::new(SegmentState::Active),
        })
    }

    /// Open an existing segment file in the given state
    pub fn open(path: &Path, id: SegmentId, state: SegmentState) -> Result<Self> {
        let file = OpenOptions::new().read(true).append(true).open(path)?;
        let metadata = file.metadata()?;
        let created_at = metadata
            .created()
            .or_else(|_| metadata.modified())
            .unwrap_or_else(|_| SystemTime::now());

        Ok(Self {
            id,
            path: Mutex::new(path.to_path_buf()),
            file,
            size: AtomicU64::new(metadata.len()),
            created_at,
            state: Mutex::new(state),
        })
    }

    /// Append a record, returning the offset it was written at.
    ///
    /// On failure the file is cut back to its previous length, so no partial
    /// record is left behind.
    pub fn append(&self, record: &Record) -> Result<u64> {
        let state = self.state.lock();
        if *state != SegmentState::Active {
            return Err(VaultError::SegmentSealed(self.id));
        }

        let offset = self.size.load(Ordering::Acquire);
        let bytes = record::encode(record);

        if let Err(e) = (&self.file).write_all(&bytes) {
            if let Err(rollback) = self.file.set_len(offset) {
                tracing::error!(
                    segment = %self.id,
                    offset,
                    error = %rollback,
                    "failed to roll back partial append"
                );
            }
            return Err(VaultError::Io(e));
        }

        self.size.store(offset + bytes.len() as u64, Ordering::Release);
        drop(state);

        Ok(offset)
    }

    /// Read the record at `offset` and check it belongs to `expected_key`
    pub fn read_at(&self, offset: u64, expected_key: &[u8]) -> Result<Record> {
        let record = self.read_record_at(offset)?;
        if record.key.as_ref() != expected_key {
            return Err(VaultError::KeyMismatch { offset });
        }
        Ok(record)
    }

    /// Read the record at `offset` without a key check
    pub fn read_record_at(&self, offset: u64) -> Result<Record> {
        let size = self.size();
        if offset + HEADER_SIZE as u64 > size {
            return Err(VaultError::CorruptHeader { offset });
        }

        let mut header = [0u8; HEADER_SIZE];
        read_exact_at(&self.file, &mut header, offset).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => VaultError::CorruptHeader { offset },
            _ => VaultError::Io(e),
        })?;
        let header = RecordHeader::decode(&header)?;

        let needed = header.record_len();
        let available = size - offset;
        if needed > available {
            return Err(VaultError::TruncatedRecord {
                offset,
                needed,
                available,
            });
        }

        let mut body = vec![0u8; header.body_len() as usize];
        read_exact_at(&self.file, &mut body, offset + HEADER_SIZE as u64).map_err(|e| {
            match e.kind() {
                io::ErrorKind::UnexpectedEof => VaultError::TruncatedRecord {
                    offset,
                    needed,
                    available,
                },
                _ => VaultError::Io(e),
            }
        })?;

        Ok(header.into_record(Bytes::from(body)))
    }

    /// Sequentially scan the segment from the start with a fresh read cursor
    pub fn scan(&self) -> Result<SegmentScanner> {
        let path = self.path.lock();
        SegmentScanner::open(&path, self.id)
    }

    /// Seal the segment: fsync, then move it to `sealed_path`.
    ///
    /// Sealing an already sealed segment is a no-op.
    pub fn seal(&self, sealed_path: &Path) -> Result<()> {
        let mut state = self.state.lock();
        if *state != SegmentState::Active {
            return Ok(());
        }

        self.file.sync_all()?;

        let mut path = self.path.lock();
        if *path != sealed_path {
            fs::rename(&*path, sealed_path)?;
            *path = sealed_path.to_path_buf();
        }

        *state = SegmentState::Sealed;
        Ok(())
    }

    /// fsync file contents
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    /// Cut the file back to `len` bytes (recovery of a torn tail)
    pub fn truncate(&self, len: u64) -> Result<()> {
        let _state = self.state.lock();
        self.file.set_len(len)?;
        self.file.sync_all()?;
        self.size.store(len, Ordering::Release);
        Ok(())
    }

    /// Delete the segment file from disk
    pub fn remove_file(&self) -> Result<()> {
        let path = self.path.lock();
        fs::remove_file(&*path)?;
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn path(&self) -> PathBuf {
        self.path.lock().clone()
    }

    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn state(&self) -> SegmentState {
        *self.state.lock()
    }

    /// Move between the compaction states (Sealed, Compacting, Retired)
    pub(crate) fn set_state(&self, state: SegmentState) {
        *self.state.lock() = state;
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("path", &self.path())
            .field("size", &self.size())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
