//! Startup Recovery
//!
//! Rebuilds the in-memory state from the segment files.
//!
//! Segments are replayed oldest id first, records in offset order, so the
//! last write for a key wins. A compaction output always sorts after the
//! segments it replaced, which makes a crash between installing the output
//! and deleting the originals harmless: the duplicates replay to the same
//! final state.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::index::{IndexEntry, KeyIndex, Location, TimeIndex};
use crate::segment::{Segment, SegmentId, SegmentState};

use super::{SegmentFileKind, StorageManager};

/// Result of a recovery pass
#[derive(Debug, Default, Clone)]
pub struct RecoveryResult {
    /// Number of segment files replayed
    pub segments_replayed: usize,

    /// Number of records replayed (values and tombstones)
    pub records_replayed: u64,

    /// Number of tombstones among them
    pub tombstones_replayed: u64,

    /// Largest record timestamp seen
    pub last_timestamp: u64,

    /// Unreadable bytes left behind at the end of the active segment
    pub torn_bytes: u64,

    /// Active segment that ended in unreadable data and was sealed as is
    pub sealed_damaged: Option<SegmentId>,
}

/// Everything the engine needs to start serving
pub struct RecoveredState {
    /// All non-retired segments by id, active included
    pub segments: BTreeMap<SegmentId, Arc<Segment>>,
    pub active: Arc<Segment>,
    pub key_index: KeyIndex,
    pub time_index: TimeIndex,
    pub result: RecoveryResult,
}

/// Open every segment in the directory and replay it into fresh indexes.
///
/// The highest-numbered `.active` file stays active; any other `.active`
/// file is left over from a crash and gets sealed. If the newest segment is
/// already sealed a fresh active segment is created after it.
///
/// An active segment ending in unreadable data is sealed without cutting
/// anything off, and writing continues in a fresh segment. The bytes past the
/// last good record may be a torn write or a damaged header; either way they
/// stay on disk.
pub fn recover(storage: &StorageManager) -> Result<RecoveredState> {
    let discovered = storage.discover()?;
    let newest = discovered.last().map(|s| s.id);

    let mut segments: BTreeMap<SegmentId, Arc<Segment>> = BTreeMap::new();
    let mut active: Option<Arc<Segment>> = None;

    for found in &discovered {
        let segment = match found.kind {
            SegmentFileKind::Active if Some(found.id) == newest => {
                let segment = Arc::new(Segment::open(&found.path, found.id, SegmentState::Active)?);
                active = Some(Arc::clone(&segment));
                segment
            }
            SegmentFileKind::Active => {
                tracing::warn!(segment = %found.id, "sealing stale active segment");
                let segment = Segment::open(&found.path, found.id, SegmentState::Active)?;
                storage.seal(&segment)?;
                Arc::new(segment)
            }
            _ => Arc::new(Segment::open(&found.path, found.id, SegmentState::Sealed)?),
        };
        segments.insert(found.id, segment);
    }

    let mut key_index = KeyIndex::new();
    let mut time_index = TimeIndex::new();
    let mut result = RecoveryResult::default();

    for segment in segments.values() {
        let torn = replay_segment(segment, &mut key_index, &mut time_index, &mut result)?;
        if torn.is_some() && segment.state() == SegmentState::Active {
            storage.seal(segment)?;
            result.sealed_damaged = Some(segment.id());
            active = None;
        }
    }

    let active = match active {
        Some(segment) => segment,
        None => {
            let id = newest.map_or_else(SegmentId::first, SegmentId::next_active);
            let segment = Arc::new(storage.create_active(id)?);
            segments.insert(id, Arc::clone(&segment));
            segment
        }
    };

    Ok(RecoveredState {
        segments,
        active,
        key_index,
        time_index,
        result,
    })
}

/// Replay one segment into the indexes. Returns the number of unreadable
/// bytes at its end, if any.
fn replay_segment(
    segment: &Segment,
    key_index: &mut KeyIndex,
    time_index: &mut TimeIndex,
    result: &mut RecoveryResult,
) -> Result<Option<u64>> {
    let mut scanner = segment.scan()?;

    for item in scanner.by_ref() {
        let (offset, record) = item?;
        let tombstone = record.is_tombstone();
        let entry = IndexEntry::new(Location::new(segment.id(), offset), tombstone);

        result.records_replayed += 1;
        if tombstone {
            result.tombstones_replayed += 1;
        }
        result.last_timestamp = result.last_timestamp.max(record.timestamp);

        key_index.insert(record.key.clone(), entry);
        time_index.insert(record.timestamp, record.key, entry);
    }
    result.segments_replayed += 1;

    let Some(valid_len) = scanner.torn_tail() else {
        return Ok(None);
    };
    let torn = segment.size().saturating_sub(valid_len);
    if segment.state() == SegmentState::Active {
        tracing::warn!(
            segment = %segment.id(),
            valid_len,
            torn_bytes = torn,
            "active segment ends in unreadable data; sealing it"
        );
        result.torn_bytes += torn;
    } else {
        tracing::warn!(
            segment = %segment.id(),
            valid_len,
            torn_bytes = torn,
            "sealed segment ends in unreadable data; ignoring the tail"
        );
    }
    Ok(Some(torn))
}
