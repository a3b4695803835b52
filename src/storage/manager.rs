//! Storage Manager
//!
//! Manages the segment files inside the data directory.
//!
//! ## Responsibilities
//! - Hold the exclusive advisory lock on the directory
//! - Discover existing segment files on startup
//! - Create, seal, and remove segment files under deterministic names
//! - Make renames durable by syncing the directory

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use parking_lot::Mutex;

use crate::error::{Result, VaultError};
use crate::segment::{Segment, SegmentId};

/// What a segment file name says about the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentFileKind {
    /// `.active`: the segment accepting writes
    Active,
    /// `.data`: an immutable segment
    Sealed,
    /// `.compact.tmp`: unfinished compaction output
    CompactionTemp,
}

impl SegmentFileKind {
    fn extension(self) -> &'static str {
        match self {
            SegmentFileKind::Active => "active",
            SegmentFileKind::Sealed => "data",
            SegmentFileKind::CompactionTemp => "compact.tmp",
        }
    }
}

/// A segment file found in the data directory
#[derive(Debug, Clone)]
pub struct DiscoveredSegment {
    pub id: SegmentId,
    pub kind: SegmentFileKind,
    pub path: PathBuf,
}

/// Manages the data directory
pub struct StorageManager {
    /// Directory where segments are stored
    data_dir: PathBuf,

    /// Locked `LOCK` file; `None` once released
    lock_file: Mutex<Option<File>>,
}

impl StorageManager {
    const LOCK_FILENAME: &'static str = "LOCK";
    const PREFIX: &'static str = "seg-";

    /// Open the data directory, creating it if needed, and take the
    /// exclusive advisory lock.
    pub fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;

        let lock_path = path.join(Self::LOCK_FILENAME);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(VaultError::DirectoryLocked(path.to_path_buf()));
        }
        tracing::debug!(dir = %path.display(), "acquired data directory lock");

        Ok(Self {
            data_dir: path.to_path_buf(),
            lock_file: Mutex::new(Some(lock_file)),
        })
    }

    /// List segment files, oldest id first.
    ///
    /// Leftover compaction temp files are deleted: a crash before the
    /// output was renamed means the originals are still authoritative.
    pub fn discover(&self) -> Result<Vec<DiscoveredSegment>> {
        let mut segments = Vec::new();

        for entry in fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let file_path = entry.path();
            if !file_path.is_file() {
                continue;
            }

            let Some((id, kind)) = file_path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(Self::parse_file_name)
            else {
                continue;
            };

            if kind == SegmentFileKind::CompactionTemp {
                tracing::warn!(
                    segment = %id,
                    path = %file_path.display(),
                    "removing unfinished compaction output"
                );
                fs::remove_file(&file_path)?;
                continue;
            }

            segments.push(DiscoveredSegment {
                id,
                kind,
                path: file_path,
            });
        }

        segments.sort_by_key(|s| s.id);
        Ok(segments)
    }

    /// Create a fresh Active segment file
    pub fn create_active(&self, id: SegmentId) -> Result<Segment> {
        let segment = Segment::create(&self.segment_path(id, SegmentFileKind::Active), id)?;
        self.sync_dir()?;
        Ok(segment)
    }

    /// Create the temp file a compaction cycle writes its survivors into
    pub fn create_compaction_output(&self, id: SegmentId) -> Result<Segment> {
        Segment::create(&self.segment_path(id, SegmentFileKind::CompactionTemp), id)
    }

    /// Seal a segment under its permanent name and make the rename durable
    pub fn seal(&self, segment: &Segment) -> Result<()> {
        segment.seal(&self.segment_path(segment.id(), SegmentFileKind::Sealed))?;
        self.sync_dir()
    }

    /// Fsync the directory so creates, renames and removals survive a crash
    #[cfg(unix)]
    pub fn sync_dir(&self) -> Result<()> {
        File::open(&self.data_dir)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn sync_dir(&self) -> Result<()> {
        Ok(())
    }

    /// Release the directory lock so another instance may open it
    pub fn release_lock(&self) -> Result<()> {
        if let Some(file) = self.lock_file.lock().take() {
            file.unlock()?;
            tracing::debug!(dir = %self.data_dir.display(), "released data directory lock");
        }
        Ok(())
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // =========================================================================
    // Naming
    // =========================================================================

    /// Generate the file path for a segment
    pub fn segment_path(&self, id: SegmentId, kind: SegmentFileKind) -> PathBuf {
        self.data_dir.join(Self::file_name(id, kind))
    }

    /// "seg-00000000000000000042-00001.data"
    pub fn file_name(id: SegmentId, kind: SegmentFileKind) -> String {
        format!(
            "{}{:020}-{:05}.{}",
            Self::PREFIX,
            id.sequence,
            id.generation,
            kind.extension()
        )
    }

    /// Parse a segment file name; `None` for files that are not ours
    pub fn parse_file_name(name: &str) -> Option<(SegmentId, SegmentFileKind)> {
        let rest = name.strip_prefix(Self::PREFIX)?;
        let (stem, extension) = rest.split_once('.')?;
        let kind = match extension {
            "active" => SegmentFileKind::Active,
            "data" => SegmentFileKind::Sealed,
            "compact.tmp" => SegmentFileKind::CompactionTemp,
            _ => return None,
        };

        let (sequence, generation) = stem.split_once('-')?;
        let id = SegmentId::new(sequence.parse().ok()?, generation.parse().ok()?);
        Some((id, kind))
    }
}
