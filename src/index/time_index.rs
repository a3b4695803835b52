//! Time index
//!
//! Ordered map of write events keyed by `(timestamp, key)`. Every put and
//! delete adds an event, so a key appears once per write, not once overall.

use std::collections::BTreeMap;
use std::ops::Bound;

use bytes::Bytes;

use super::{IndexEntry, Relocation};

/// Timestamp-ordered history of write events
#[derive(Debug, Default)]
pub struct TimeIndex {
    entries: BTreeMap<(u64, Bytes), IndexEntry>,
}

impl TimeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write event. Replaying the same event twice (a compacted copy
    /// next to its original) keeps a single entry.
    pub fn insert(&mut self, timestamp: u64, key: Bytes, entry: IndexEntry) {
        self.entries.insert((timestamp, key), entry);
    }

    /// Events with `start <= timestamp <= end`, in timestamp order
    pub fn range(
        &self,
        start: u64,
        end: u64,
    ) -> impl Iterator<Item = (u64, &Bytes, &IndexEntry)> + '_ {
        let bounds = if start > end {
            None
        } else {
            let lower = Bound::Included((start, Bytes::new()));
            let upper = match end.checked_add(1) {
                Some(next) => Bound::Excluded((next, Bytes::new())),
                None => Bound::Unbounded,
            };
            Some((lower, upper))
        };

        bounds
            .into_iter()
            .flat_map(move |bounds| self.entries.range(bounds))
            .map(|((timestamp, key), entry)| (*timestamp, key, entry))
    }

    /// Apply a compaction result: surviving events move, dropped ones go
    pub fn relocate(&mut self, relocation: &Relocation) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| match relocation.apply(entry) {
            Some(updated) => {
                *entry = updated;
                true
            }
            None => false,
        });
        before - self.entries.len()
    }

    /// Events pointing into retired segments at records the cycle never read
    pub fn unaccounted(&self, relocation: &Relocation) -> usize {
        self.entries
            .values()
            .filter(|entry| !relocation.accounts_for(entry))
            .count()
    }

    /// Oldest event timestamp
    pub fn first_timestamp(&self) -> Option<u64> {
        self.entries.keys().next().map(|(ts, _)| *ts)
    }

    /// Newest event timestamp
    pub fn last_timestamp(&self) -> Option<u64> {
        self.entries.keys().next_back().map(|(ts, _)| *ts)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
