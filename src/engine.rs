//! Engine Module
//!
//! The storage engine that coordinates segments, indexes and compaction.
//!
//! ## Responsibilities
//! - Rotate the active segment on size or age
//! - Write path: append, then index (readers never see an index entry
//!   before its record is on disk)
//! - Read path: resolve key → (segment, offset) → record
//! - Rebuild both indexes from the segment files on open
//! - Run the background compactor and stop it on close

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::compaction::{self, CompactionScheduler, CompactionStats};
use crate::config::{Config, SyncStrategy};
use crate::error::{Result, VaultError};
use crate::index::{IndexEntry, KeyIndex, Location, TimeIndex};
use crate::record::Record;
use crate::segment::{Segment, SegmentId, SegmentState};
use crate::storage::{self, RecoveryResult, StorageManager};

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/delete/rotate, compaction commit): serialized by the
///   `writer` mutex, which also owns the active segment handle.
///   Lock order is always `writer` → `state`.
///
/// - **Reads** (get/time_range_query): take the `state` read lock only long
///   enough to resolve a location and clone the segment handle, then read
///   with positional I/O outside any lock.
///
/// - **Compaction**: scans sealed segments without engine locks, then
///   commits under `writer` + `state` write lock before deleting files.
pub struct Engine {
    inner: Arc<EngineInner>,

    /// Background compactor, `None` when disabled or after close
    compactor: Mutex<Option<CompactionScheduler>>,
}

/// State shared between the engine handle and the compactor thread
pub(crate) struct EngineInner {
    pub(crate) config: Config,
    pub(crate) storage: StorageManager,
    pub(crate) writer: Mutex<WriterState>,
    pub(crate) state: RwLock<EngineState>,
    /// Set by close; also cancels an in-flight compaction cycle
    pub(crate) closed: AtomicBool,
    /// One compaction cycle at a time
    pub(crate) compaction_lock: Mutex<()>,
}

/// Owned by whoever holds the writer lock
pub(crate) struct WriterState {
    pub(crate) active: Arc<Segment>,
    last_rotation: Instant,
    last_timestamp: u64,
    unsynced: usize,
}

/// Everything readers look at
pub(crate) struct EngineState {
    /// Active, sealed and compacting segments by id
    pub(crate) segments: BTreeMap<SegmentId, Arc<Segment>>,
    /// Replaced segments whose files could not be deleted yet, oldest first
    pub(crate) retired: Vec<Arc<Segment>>,
    pub(crate) key_index: KeyIndex,
    pub(crate) time_index: TimeIndex,
}

/// Kind of write event in the history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Put,
    Delete,
}

/// One write event returned by [`Engine::history`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEvent {
    pub timestamp: u64,
    pub key: Vec<u8>,
    pub kind: EventKind,
}

/// Snapshot of one segment's bookkeeping
#[derive(Debug, Clone, Serialize)]
pub struct SegmentInfo {
    pub id: SegmentId,
    pub state: SegmentState,
    pub size: u64,
    pub created_at: SystemTime,
}

/// Engine-wide counters
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub segment_count: usize,
    pub active_segment: SegmentId,
    pub active_size: u64,
    pub live_keys: usize,
    pub indexed_keys: usize,
    pub history_events: usize,
    /// Oldest and newest timestamps still in the history
    pub first_timestamp: Option<u64>,
    pub last_timestamp: Option<u64>,
    pub disk_bytes: u64,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Lock the data directory
    /// 2. Discover segment files and pick the active one
    /// 3. Replay every segment to rebuild the key and time indexes
    /// 4. Start the background compactor
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let storage = StorageManager::open(&config.data_dir)?;
        let recovered = storage::recover(&storage)?;
        log_recovery(&config, &recovered.result, recovered.segments.len());

        let writer = WriterState {
            active: recovered.active,
            last_rotation: Instant::now(),
            last_timestamp: recovered.result.last_timestamp,
            unsynced: 0,
        };
        let state = EngineState {
            segments: recovered.segments,
            retired: Vec::new(),
            key_index: recovered.key_index,
            time_index: recovered.time_index,
        };

        let inner = Arc::new(EngineInner {
            config,
            storage,
            writer: Mutex::new(writer),
            state: RwLock::new(state),
            closed: AtomicBool::new(false),
            compaction_lock: Mutex::new(()),
        });

        let compactor = if inner.config.background_compaction {
            Some(CompactionScheduler::start(
                Arc::clone(&inner),
                inner.config.compaction_interval,
            )?)
        } else {
            None
        };

        Ok(Self {
            inner,
            compactor: Mutex::new(compactor),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(config)
    }

    /// Put a key-value pair, returning the write timestamp.
    ///
    /// An empty value is stored as a tombstone, i.e. it deletes the key.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<u64> {
        self.inner.write(key, Some(value))
    }

    /// Get a value by key
    ///
    /// Returns `Ok(None)` if the key was never written or is deleted.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.ensure_open()?;

        let (segment, location) = {
            let state = self.inner.state.read();
            let Some(entry) = state.key_index.get(key) else {
                return Ok(None);
            };
            if entry.tombstone {
                return Ok(None);
            }
            let segment = state
                .segments
                .get(&entry.location.segment)
                .cloned()
                .ok_or(VaultError::UnknownSegment(entry.location.segment))?;
            (segment, entry.location)
        };

        let record = segment
            .read_at(location.offset, key)
            .map_err(|e| match e {
                VaultError::KeyMismatch { offset } => VaultError::CorruptIndex {
                    segment: location.segment,
                    offset,
                },
                other => other,
            })?;

        Ok(record.into_value().map(|value| value.to_vec()))
    }

    /// Delete a key by appending a tombstone, returning the write timestamp
    pub fn delete(&self, key: &[u8]) -> Result<u64> {
        self.inner.write(key, None)
    }

    /// Keys written (put or deleted) with `start <= timestamp <= end`, in
    /// timestamp order, once per write event.
    pub fn time_range_query(&self, start: u64, end: u64) -> Result<Vec<Vec<u8>>> {
        self.inner.ensure_open()?;

        let state = self.inner.state.read();
        Ok(state
            .time_index
            .range(start, end)
            .map(|(_, key, _)| key.to_vec())
            .collect())
    }

    /// Like [`Engine::time_range_query`], with timestamps and event kinds
    pub fn history(&self, start: u64, end: u64) -> Result<Vec<HistoryEvent>> {
        self.inner.ensure_open()?;

        let state = self.inner.state.read();
        Ok(state
            .time_index
            .range(start, end)
            .map(|(timestamp, key, entry)| HistoryEvent {
                timestamp,
                key: key.to_vec(),
                kind: if entry.tombstone {
                    EventKind::Delete
                } else {
                    EventKind::Put
                },
            })
            .collect())
    }

    /// Seal the active segment now and start a new one.
    ///
    /// Does nothing if the active segment is empty.
    pub fn rotate(&self) -> Result<()> {
        self.inner.ensure_open()?;
        let mut writer = self.inner.writer.lock();
        self.inner.ensure_open()?;
        self.inner.rotate_locked(&mut writer)
    }

    /// Run one compaction cycle now
    pub fn compact(&self) -> Result<CompactionStats> {
        self.inner.ensure_open()?;
        compaction::run_cycle(&self.inner, &self.inner.closed)
    }

    /// Force sync the active segment to disk
    pub fn sync(&self) -> Result<()> {
        self.inner.ensure_open()?;
        let mut writer = self.inner.writer.lock();
        writer.active.sync()?;
        writer.unsynced = 0;
        Ok(())
    }

    /// Close the engine gracefully
    ///
    /// Stops the compactor (waiting for an in-flight cycle to reach a safe
    /// point), seals the active segment (or removes it if nothing was
    /// written to it), drops all file handles and releases the directory
    /// lock. Later calls on this engine fail with
    /// `EngineClosed`; closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(scheduler) = self.compactor.lock().take() {
            scheduler.shutdown();
        }
        // Wait out a manual compaction that is still running
        let _cycle = self.inner.compaction_lock.lock();

        {
            let writer = self.inner.writer.lock();
            if writer.active.is_empty() {
                writer.active.remove_file()?;
                self.inner.storage.sync_dir()?;
            } else {
                self.inner.storage.seal(&writer.active)?;
            }

            let mut state = self.inner.state.write();
            state.segments.clear();
            state.retired.clear();
            state.key_index.clear();
            state.time_index.clear();
        }

        self.inner.storage.release_lock()?;
        tracing::info!(dir = %self.data_dir().display(), "engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        self.inner.storage.data_dir()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Id of the segment currently accepting writes
    pub fn active_segment_id(&self) -> SegmentId {
        self.inner.writer.lock().active.id()
    }

    /// Number of segments the engine is tracking (active included)
    pub fn segment_count(&self) -> usize {
        self.inner.state.read().segments.len()
    }

    /// Bookkeeping of every tracked segment, oldest first
    pub fn segments(&self) -> Vec<SegmentInfo> {
        let state = self.inner.state.read();
        state
            .segments
            .values()
            .map(|segment| SegmentInfo {
                id: segment.id(),
                state: segment.state(),
                size: segment.size(),
                created_at: segment.created_at(),
            })
            .collect()
    }

    /// Total bytes of segment files on disk, including retired files that
    /// are still waiting to be deleted
    pub fn disk_usage(&self) -> u64 {
        let state = self.inner.state.read();
        state
            .segments
            .values()
            .chain(state.retired.iter())
            .map(|segment| segment.size())
            .sum()
    }

    pub fn stats(&self) -> EngineStats {
        let writer = self.inner.writer.lock();
        let state = self.inner.state.read();
        EngineStats {
            segment_count: state.segments.len(),
            active_segment: writer.active.id(),
            active_size: writer.active.size(),
            live_keys: state.key_index.live_len(),
            indexed_keys: state.key_index.len(),
            history_events: state.time_index.len(),
            first_timestamp: state.time_index.first_timestamp(),
            last_timestamp: state.time_index.last_timestamp(),
            disk_bytes: state
                .segments
                .values()
                .chain(state.retired.iter())
                .map(|segment| segment.size())
                .sum(),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(error = %e, "failed to close engine on drop");
        }
    }
}

impl EngineInner {
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(VaultError::EngineClosed);
        }
        Ok(())
    }

    /// Shared put/delete path (`value == None` writes a tombstone)
    ///
    /// Steps:
    /// 1. Acquire writer lock
    /// 2. Rotate the active segment if due
    /// 3. Append the record (and sync per strategy)
    /// 4. Update key index and time index
    fn write(&self, key: &[u8], value: Option<&[u8]>) -> Result<u64> {
        self.ensure_open()?;
        let mut writer = self.writer.lock();
        // close() may have sealed the active segment while we waited
        self.ensure_open()?;

        let timestamp = writer.next_timestamp();
        let key = Bytes::copy_from_slice(key);
        let record = match value {
            Some(value) => Record::put(timestamp, key, Bytes::copy_from_slice(value)),
            None => Record::tombstone(timestamp, key),
        };
        record.validate()?;

        if self.should_rotate(&writer) {
            self.rotate_locked(&mut writer)?;
        }

        let offset = writer.active.append(&record)?;
        if let Err(e) = self.sync_after_append(&mut writer) {
            if let Err(rollback) = writer.active.truncate(offset) {
                tracing::error!(error = %rollback, "failed to roll back unsynced append");
            }
            return Err(e);
        }

        let entry = IndexEntry::new(
            Location::new(writer.active.id(), offset),
            record.is_tombstone(),
        );

        let mut state = self.state.write();
        state.key_index.insert(record.key.clone(), entry);
        state.time_index.insert(timestamp, record.key, entry);

        Ok(timestamp)
    }

    fn should_rotate(&self, writer: &WriterState) -> bool {
        writer.active.state() != SegmentState::Active
            || writer.active.size() >= self.config.segment_max_bytes
            || writer.last_rotation.elapsed() > self.config.segment_interval
    }

    /// Seal the active segment and install a new one (writer lock held)
    pub(crate) fn rotate_locked(&self, writer: &mut WriterState) -> Result<()> {
        let sealed = writer.active.state() != SegmentState::Active;
        if writer.active.is_empty() && !sealed {
            writer.last_rotation = Instant::now();
            return Ok(());
        }

        let old_id = writer.active.id();
        let old_size = writer.active.size();
        self.storage.seal(&writer.active)?;

        let next_id = old_id.next_active();
        let segment = Arc::new(self.storage.create_active(next_id)?);
        self.state
            .write()
            .segments
            .insert(next_id, Arc::clone(&segment));

        writer.active = segment;
        writer.last_rotation = Instant::now();
        writer.unsynced = 0;

        tracing::info!(sealed = %old_id, size = old_size, active = %next_id, "rotated segment");
        Ok(())
    }

    fn sync_after_append(&self, writer: &mut WriterState) -> Result<()> {
        match self.config.sync_strategy {
            SyncStrategy::EveryWrite => writer.active.sync(),
            SyncStrategy::EveryNEntries { count } => {
                writer.unsynced += 1;
                if writer.unsynced >= count {
                    writer.active.sync()?;
                    writer.unsynced = 0;
                }
                Ok(())
            }
        }
    }
}

impl WriterState {
    /// Wall-clock nanoseconds, bumped so timestamps never repeat or go back
    fn next_timestamp(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        self.last_timestamp = now.max(self.last_timestamp.saturating_add(1));
        self.last_timestamp
    }
}

fn log_recovery(config: &Config, result: &RecoveryResult, segments: usize) {
    tracing::info!(
        dir = %config.data_dir.display(),
        segments,
        records = result.records_replayed,
        tombstones = result.tombstones_replayed,
        torn_bytes = result.torn_bytes,
        "engine opened"
    );
    if let Some(damaged) = result.sealed_damaged {
        tracing::warn!(segment = %damaged, "active segment ended in unreadable data and was sealed");
    }
}
