//! Index Module
//!
//! In-memory indexes over the segment set. Both are rebuilt from the segment
//! files on open; nothing here is persisted.
//!
//! - [`KeyIndex`]: key → location of the latest write for that key
//! - [`TimeIndex`]: (timestamp, key) → location, one entry per write event

mod key_index;
mod time_index;

use std::collections::{HashMap, HashSet};

use crate::segment::SegmentId;

pub use key_index::KeyIndex;
pub use time_index::TimeIndex;

/// Where a record lives on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub segment: SegmentId,
    pub offset: u64,
}

impl Location {
    pub fn new(segment: SegmentId, offset: u64) -> Self {
        Self { segment, offset }
    }
}

/// Value stored in both indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub location: Location,
    /// The record at `location` is a tombstone
    pub tombstone: bool,
}

impl IndexEntry {
    pub fn new(location: Location, tombstone: bool) -> Self {
        Self {
            location,
            tombstone,
        }
    }
}

/// How a compaction cycle rewrote locations: records that survived moved to
/// `moved[old]`, records judged obsolete or tombstoned are in `dropped`.
/// Only records the cycle actually read appear in either.
#[derive(Debug, Default)]
pub struct Relocation {
    pub moved: HashMap<Location, Location>,
    pub dropped: HashSet<Location>,
    pub retired: HashSet<SegmentId>,
}

impl Relocation {
    /// Whether the cycle read the record behind `entry`. Entries outside the
    /// retired segments are always accounted for.
    pub fn accounts_for(&self, entry: &IndexEntry) -> bool {
        !self.retired.contains(&entry.location.segment)
            || self.moved.contains_key(&entry.location)
            || self.dropped.contains(&entry.location)
    }

    /// New location for `entry`, `None` if its record was dropped.
    /// Entries outside the retired segments are returned unchanged.
    pub(crate) fn apply(&self, entry: &IndexEntry) -> Option<IndexEntry> {
        if !self.retired.contains(&entry.location.segment) {
            return Some(*entry);
        }
        self.moved
            .get(&entry.location)
            .map(|&location| IndexEntry::new(location, entry.tombstone))
    }
}
