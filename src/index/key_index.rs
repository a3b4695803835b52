//! Key index
//!
//! Hash map from key to the location of its most recent record.

use std::collections::HashMap;

use bytes::Bytes;

use super::{IndexEntry, Location, Relocation};

/// Maps each key to its latest write (value or tombstone)
#[derive(Debug, Default)]
pub struct KeyIndex {
    entries: HashMap<Bytes, IndexEntry>,
    /// Entries whose latest write is a value
    live: usize,
}

impl KeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `key` at a newer write, returning the entry it replaces
    pub fn insert(&mut self, key: Bytes, entry: IndexEntry) -> Option<IndexEntry> {
        let previous = self.entries.insert(key, entry);
        if previous.is_some_and(|p| !p.tombstone) {
            self.live -= 1;
        }
        if !entry.tombstone {
            self.live += 1;
        }
        previous
    }

    pub fn get(&self, key: &[u8]) -> Option<&IndexEntry> {
        self.entries.get(key)
    }

    /// Whether `key`'s latest write lives exactly at `location`
    pub fn points_at(&self, key: &[u8], location: Location) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.location == location)
    }

    /// Apply a compaction result. Entries whose record was dropped (tombstones)
    /// are removed. Returns how many entries were removed.
    pub fn relocate(&mut self, relocation: &Relocation) -> usize {
        let before = self.entries.len();
        let mut live_removed = 0;

        self.entries.retain(|_, entry| match relocation.apply(entry) {
            Some(updated) => {
                *entry = updated;
                true
            }
            None => {
                if !entry.tombstone {
                    live_removed += 1;
                }
                false
            }
        });

        self.live -= live_removed;
        before - self.entries.len()
    }

    /// Entries pointing into retired segments at records the cycle never read
    pub fn unaccounted(&self, relocation: &Relocation) -> usize {
        self.entries
            .values()
            .filter(|entry| !relocation.accounts_for(entry))
            .count()
    }

    /// Keys whose latest write is a value
    pub fn live_len(&self) -> usize {
        self.live
    }

    /// All tracked keys, tombstoned ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.live = 0;
    }
}
