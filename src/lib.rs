//! # logvault
//!
//! An append-only key-value store with time-range lookup, built as the
//! persistence backend for log ingestion:
//! - Segment files with size/age based rotation
//! - In-memory key index and timestamp-ordered history index
//! - Crash recovery by replaying the segment files
//! - Background compaction of overwritten and deleted records
//! - Single-writer/multi-reader concurrency model
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Engine                                │
//! │            (Single Writer / Multi Reader)                    │
//! └──────┬──────────────────────┬──────────────────────┬────────┘
//!        │ append               │ index                │ background
//!        ▼                      ▼                      ▼
//!  ┌─────────────┐   ┌─────────────────────┐   ┌─────────────┐
//!  │  Segments   │   │ KeyIndex  TimeIndex │   │  Compactor  │
//!  │ (1 active)  │   │      (RwLock)       │   │  (thread)   │
//!  └──────┬──────┘   └─────────────────────┘   └──────┬──────┘
//!         │                                           │
//!         ▼                                           │
//!  ┌─────────────┐                                    │
//!  │   Storage   │◄───────── rewrite sealed ──────────┘
//!  │ (data dir)  │
//!  └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod segment;
pub mod index;
pub mod storage;
pub mod compaction;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, VaultError};
pub use config::{Config, SyncStrategy};
pub use compaction::CompactionStats;
pub use engine::{Engine, EngineStats, EventKind, HistoryEvent, SegmentInfo};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of logvault
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
