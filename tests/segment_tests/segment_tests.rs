//! Tests for Segment
//!
//! These tests verify:
//! - Append returns increasing offsets and tracks size
//! - Positional reads with key verification
//! - Sealing (rename, immutability, idempotence)
//! - Truncation and reopening

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use logvault::record::{Record, HEADER_SIZE};
use logvault::segment::{Segment, SegmentId, SegmentState};
use logvault::VaultError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_segment() -> (TempDir, PathBuf, Segment) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("seg-1.active");
    let segment = Segment::create(&path, SegmentId::first()).unwrap();
    (temp_dir, path, segment)
}

// =============================================================================
// Append Tests
// =============================================================================

#[test]
fn test_create_is_empty_and_active() {
    let (_temp, path, segment) = setup_segment();

    assert!(path.exists());
    assert!(segment.is_empty());
    assert_eq!(segment.size(), 0);
    assert_eq!(segment.state(), SegmentState::Active);
    assert_eq!(segment.id(), SegmentId::new(1, 0));
}

#[test]
fn test_create_refuses_existing_file() {
    let (_temp, path, _segment) = setup_segment();

    let result = Segment::create(&path, SegmentId::first());

    assert!(matches!(result, Err(VaultError::Io(_))));
}

#[test]
fn test_append_offsets_follow_record_sizes() {
    let (_temp, _path, segment) = setup_segment();
    let first = Record::put(1, &b"a"[..], &b"one"[..]);
    let second = Record::put(2, &b"bb"[..], &b"two"[..]);

    let off1 = segment.append(&first).unwrap();
    let off2 = segment.append(&second).unwrap();

    assert_eq!(off1, 0);
    assert_eq!(off2, first.encoded_len());
    assert_eq!(segment.size(), first.encoded_len() + second.encoded_len());
    assert!(!segment.is_empty());
}

// =============================================================================
// Read Tests
// =============================================================================

#[test]
fn test_read_at_returns_record() {
    let (_temp, _path, segment) = setup_segment();
    segment.append(&Record::put(1, &b"a"[..], &b"one"[..])).unwrap();
    let offset = segment.append(&Record::put(2, &b"b"[..], &b"two"[..])).unwrap();

    let record = segment.read_at(offset, b"b").unwrap();

    assert_eq!(record.timestamp, 2);
    assert_eq!(record.value().map(|v| v.as_ref()), Some(&b"two"[..]));
}

#[test]
fn test_read_at_detects_key_mismatch() {
    let (_temp, _path, segment) = setup_segment();
    let offset = segment.append(&Record::put(1, &b"a"[..], &b"one"[..])).unwrap();

    let result = segment.read_at(offset, b"other");

    assert!(matches!(result, Err(VaultError::KeyMismatch { offset: 0 })));
}

#[test]
fn test_read_past_end_is_corrupt_header() {
    let (_temp, _path, segment) = setup_segment();
    segment.append(&Record::put(1, &b"a"[..], &b"one"[..])).unwrap();

    let result = segment.read_record_at(segment.size());

    assert!(matches!(result, Err(VaultError::CorruptHeader { .. })));
}

#[test]
fn test_read_tombstone() {
    let (_temp, _path, segment) = setup_segment();
    let offset = segment.append(&Record::tombstone(5, &b"gone"[..])).unwrap();

    let record = segment.read_at(offset, b"gone").unwrap();

    assert!(record.is_tombstone());
    assert_eq!(segment.size(), (HEADER_SIZE + 4) as u64);
}

#[test]
fn test_concurrent_reads_share_handle() {
    let (_temp, _path, segment) = setup_segment();
    let mut offsets = Vec::new();
    for i in 0..50u64 {
        let key = format!("key_{}", i);
        let value = format!("value_{}", i);
        let offset = segment
            .append(&Record::put(i + 1, key.into_bytes(), value.into_bytes()))
            .unwrap();
        offsets.push(offset);
    }
    let segment = Arc::new(segment);
    let offsets = Arc::new(offsets);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let segment = Arc::clone(&segment);
            let offsets = Arc::clone(&offsets);
            thread::spawn(move || {
                for (i, offset) in offsets.iter().enumerate().rev() {
                    let key = format!("key_{}", i);
                    let record = segment.read_at(*offset, key.as_bytes()).unwrap();
                    assert_eq!(
                        record.value().map(|v| v.to_vec()),
                        Some(format!("value_{}", i).into_bytes())
                    );
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

// =============================================================================
// Seal Tests
// =============================================================================

#[test]
fn test_seal_renames_and_rejects_appends() {
    let (temp, path, segment) = setup_segment();
    let offset = segment.append(&Record::put(1, &b"k"[..], &b"v"[..])).unwrap();
    let sealed_path = temp.path().join("seg-1.data");

    segment.seal(&sealed_path).unwrap();

    assert!(!path.exists());
    assert!(sealed_path.exists());
    assert_eq!(segment.path(), sealed_path);
    assert_eq!(segment.state(), SegmentState::Sealed);

    // Reads still work through the open handle
    let record = segment.read_at(offset, b"k").unwrap();
    assert_eq!(record.timestamp, 1);

    let result = segment.append(&Record::put(2, &b"k"[..], &b"v2"[..]));
    assert!(matches!(result, Err(VaultError::SegmentSealed(id)) if id == SegmentId::first()));
}

#[test]
fn test_seal_twice_is_noop() {
    let (temp, _path, segment) = setup_segment();
    let sealed_path = temp.path().join("seg-1.data");

    segment.seal(&sealed_path).unwrap();
    segment.seal(&temp.path().join("elsewhere.data")).unwrap();

    assert_eq!(segment.path(), sealed_path);
}

// =============================================================================
// Truncate / Reopen Tests
// =============================================================================

#[test]
fn test_truncate_cuts_size() {
    let (_temp, path, segment) = setup_segment();
    let first = Record::put(1, &b"a"[..], &b"one"[..]);
    segment.append(&first).unwrap();
    segment.append(&Record::put(2, &b"b"[..], &b"two"[..])).unwrap();

    segment.truncate(first.encoded_len()).unwrap();

    assert_eq!(segment.size(), first.encoded_len());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), first.encoded_len());

    // Appends continue from the new end
    let offset = segment.append(&Record::put(3, &b"c"[..], &b"three"[..])).unwrap();
    assert_eq!(offset, first.encoded_len());
}

#[test]
fn test_open_existing_segment() {
    let (_temp, path, segment) = setup_segment();
    segment.append(&Record::put(1, &b"a"[..], &b"one"[..])).unwrap();
    let offset = segment.append(&Record::put(2, &b"b"[..], &b"two"[..])).unwrap();
    let size = segment.size();
    drop(segment);

    let reopened = Segment::open(&path, SegmentId::first(), SegmentState::Sealed).unwrap();

    assert_eq!(reopened.size(), size);
    assert_eq!(reopened.state(), SegmentState::Sealed);
    assert_eq!(reopened.read_at(offset, b"b").unwrap().timestamp, 2);
}

#[test]
fn test_remove_file() {
    let (_temp, path, segment) = setup_segment();

    segment.remove_file().unwrap();

    assert!(!path.exists());
}

// =============================================================================
// SegmentId Tests
// =============================================================================

#[test]
fn test_segment_id_ordering() {
    let first = SegmentId::first();
    let next = first.next_active();
    let compacted = next.compacted_successor();
    let after = compacted.next_active();

    assert!(first < next);
    assert!(next < compacted);
    assert!(compacted < after);
    assert_eq!(compacted, SegmentId::new(2, 1));
    assert_eq!(after, SegmentId::new(3, 0));
    assert_eq!(compacted.to_string(), "2.1");
}
