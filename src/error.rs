//! Error types for logvault
//!
//! Provides a unified error type for all operations.
//!
//! A missing or deleted key is not an error: lookups return `Ok(None)`.

use std::path::PathBuf;

use thiserror::Error;

use crate::segment::SegmentId;

/// Result type alias using VaultError
pub type Result<T> = std::result::Result<T, VaultError>;

/// Unified error type for logvault operations
#[derive(Debug, Error)]
pub enum VaultError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt record header at offset {offset}")]
    CorruptHeader { offset: u64 },

    #[error("Truncated record at offset {offset}: needed {needed} bytes, {available} available")]
    TruncatedRecord {
        offset: u64,
        needed: u64,
        available: u64,
    },

    #[error("Record {field} too large: {len} bytes")]
    RecordTooLarge { field: &'static str, len: usize },

    // -------------------------------------------------------------------------
    // Segment / Index Errors
    // -------------------------------------------------------------------------
    #[error("Key mismatch at offset {offset}")]
    KeyMismatch { offset: u64 },

    #[error("Corrupt index: entry points at {segment}@{offset} holding a different key")]
    CorruptIndex { segment: SegmentId, offset: u64 },

    #[error("Segment {0} is sealed")]
    SegmentSealed(SegmentId),

    #[error("Unknown segment {0}")]
    UnknownSegment(SegmentId),

    // -------------------------------------------------------------------------
    // Engine Errors
    // -------------------------------------------------------------------------
    #[error("Engine is closed")]
    EngineClosed,

    #[error("Data directory {0} is locked by another instance")]
    DirectoryLocked(PathBuf),

    #[error("Compaction aborted: {0}")]
    Compaction(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
