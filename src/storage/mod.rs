//! Storage Module
//!
//! Owns the data directory: the advisory lock, segment file naming,
//! discovery, and the startup recovery replay.
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/
//!   ├── LOCK                                        (advisory lock)
//!   ├── seg-00000000000000000001-00000.data         (sealed segment)
//!   ├── seg-00000000000000000001-00001.data         (compaction output)
//!   ├── seg-00000000000000000002-00000.active       (active segment)
//!   └── seg-00000000000000000001-00002.compact.tmp  (compaction in flight)
//! ```
//! Segment files are flat sequences of records with no file header. The set
//! of files, replayed in id order, is the entire persisted state.

mod manager;
mod recovery;

pub use manager::{DiscoveredSegment, SegmentFileKind, StorageManager};
pub use recovery::{recover, RecoveredState, RecoveryResult};
