//! Compaction Module
//!
//! Reclaims space held by overwritten and deleted records.
//!
//! ## Cycle
//! 1. Mark every Sealed segment Compacting (the active one is never touched)
//! 2. Scan them; keep a record only if the key index still points at it and
//!    it is not a tombstone
//! 3. Write survivors into a temp file, fsync, rename to its permanent name
//! 4. Under the writer lock: re-point the indexes, swap the segment set
//! 5. Delete the replaced files, oldest first
//!
//! Nothing visible changes before step 4, so a failed or cancelled cycle
//! leaves the engine exactly as it was.

mod compactor;
mod scheduler;

pub use compactor::CompactionStats;

pub(crate) use compactor::run_cycle;
pub(crate) use scheduler::CompactionScheduler;
