//! Segment Module
//!
//! A segment is one append-only file of records plus its bookkeeping.
//!
//! ## Lifecycle
//! ```text
//!   Active ──seal──► Sealed ──cycle start──► Compacting ──commit──► Retired ──► (deleted)
//!                       ▲                        │
//!                       └──────cycle abort───────┘
//! ```
//! Exactly one segment is Active at a time. Sealed segments are immutable
//! and can be read concurrently without coordination.

mod file;
mod scanner;

use std::fmt;

use serde::Serialize;

pub use file::Segment;
pub use scanner::SegmentScanner;

/// Identifies a segment and orders segments for replay.
///
/// Fresh segments take `(max_sequence + 1, 0)`. A compaction output takes
/// `(highest input sequence, highest input generation + 1)`, which sorts it
/// after every segment it replaces and before the active segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SegmentId {
    pub sequence: u64,
    pub generation: u32,
}

impl SegmentId {
    pub const fn new(sequence: u64, generation: u32) -> Self {
        Self {
            sequence,
            generation,
        }
    }

    /// The first segment of an empty directory
    pub const fn first() -> Self {
        Self::new(1, 0)
    }

    /// Id for the next fresh active segment
    pub fn next_active(self) -> Self {
        Self::new(self.sequence + 1, 0)
    }

    /// Id for a compaction output replacing segments up to and including `self`
    pub fn compacted_successor(self) -> Self {
        Self::new(self.sequence, self.generation + 1)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.sequence, self.generation)
    }
}

/// Where a segment is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SegmentState {
    /// Accepting appends
    Active,

    /// Immutable, eligible for compaction
    Sealed,

    /// Being rewritten by a compaction cycle
    Compacting,

    /// Replaced by a compaction output; file removal pending
    Retired,
}

impl fmt::Display for SegmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SegmentState::Active => "active",
            SegmentState::Sealed => "sealed",
            SegmentState::Compacting => "compacting",
            SegmentState::Retired => "retired",
        };
        f.write_str(name)
    }
}
