//! Tests for SegmentScanner
//!
//! These tests verify:
//! - Records come back in offset order
//! - A partial record at the end is reported as a torn tail, not an error
//! - The scan is bounded by the file length at open time
//! - Data vanishing inside that length is an error, not a torn tail

use std::fs::OpenOptions;
use std::io::Write;

use logvault::error::VaultError;
use logvault::record::{encode, Record, HEADER_SIZE};
use logvault::segment::{Segment, SegmentId};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_segment_with(records: &[Record]) -> (TempDir, std::path::PathBuf, Segment) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("seg-1.active");
    let segment = Segment::create(&path, SegmentId::first()).unwrap();
    for record in records {
        segment.append(record).unwrap();
    }
    (temp_dir, path, segment)
}

fn append_raw(path: &std::path::Path, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}

fn sample_records() -> Vec<Record> {
    vec![
        Record::put(1, &b"alpha"[..], &b"1"[..]),
        Record::put(2, &b"beta"[..], &b"2"[..]),
        Record::tombstone(3, &b"alpha"[..]),
        Record::put(4, &b"gamma"[..], vec![9u8; 4096]),
    ]
}

// =============================================================================
// Basic Scan Tests
// =============================================================================

#[test]
fn test_scan_empty_segment() {
    let (_temp, _path, segment) = setup_segment_with(&[]);

    let mut scanner = segment.scan().unwrap();

    assert!(scanner.next().is_none());
    assert_eq!(scanner.torn_tail(), None);
}

#[test]
fn test_scan_yields_records_in_order() {
    let records = sample_records();
    let (_temp, _path, segment) = setup_segment_with(&records);

    let scanned: Vec<(u64, Record)> = segment.scan().unwrap().map(|r| r.unwrap()).collect();

    assert_eq!(scanned.len(), records.len());
    let mut expected_offset = 0;
    for ((offset, record), expected) in scanned.iter().zip(&records) {
        assert_eq!(*offset, expected_offset);
        assert_eq!(record, expected);
        expected_offset += expected.encoded_len();
    }
}

#[test]
fn test_scan_offsets_match_reads() {
    let records = sample_records();
    let (_temp, _path, segment) = setup_segment_with(&records);

    for item in segment.scan().unwrap() {
        let (offset, record) = item.unwrap();
        assert_eq!(segment.read_at(offset, &record.key).unwrap(), record);
    }
}

#[test]
fn test_scanner_reports_segment_and_offset() {
    let records = sample_records();
    let (_temp, _path, segment) = setup_segment_with(&records);

    let mut scanner = segment.scan().unwrap();
    for item in scanner.by_ref() {
        item.unwrap();
    }

    assert_eq!(scanner.segment(), SegmentId::first());
    assert_eq!(scanner.offset(), segment.size());
}

// =============================================================================
// Torn Tail Tests
// =============================================================================

#[test]
fn test_partial_header_is_torn_tail() {
    let records = sample_records();
    let (_temp, path, segment) = setup_segment_with(&records);
    let valid_len = segment.size();
    append_raw(&path, &[0u8; HEADER_SIZE - 3]);

    let mut scanner = segment.scan().unwrap();
    let count = scanner.by_ref().map(|r| r.unwrap()).count();

    assert_eq!(count, records.len());
    assert_eq!(scanner.torn_tail(), Some(valid_len));
}

#[test]
fn test_partial_body_is_torn_tail() {
    let records = sample_records();
    let (_temp, path, segment) = setup_segment_with(&records);
    let valid_len = segment.size();
    let next = encode(&Record::put(5, &b"delta"[..], &b"never finished"[..]));
    append_raw(&path, &next[..next.len() - 4]);

    let mut scanner = segment.scan().unwrap();
    let scanned: Vec<_> = scanner.by_ref().collect();

    assert!(scanned.iter().all(|r| r.is_ok()));
    assert_eq!(scanned.len(), records.len());
    assert_eq!(scanner.torn_tail(), Some(valid_len));
}

#[test]
fn test_torn_first_record() {
    let (_temp, path, segment) = setup_segment_with(&[]);
    let bytes = encode(&Record::put(1, &b"k"[..], &b"value"[..]));
    append_raw(&path, &bytes[..HEADER_SIZE + 1]);

    let mut scanner = segment.scan().unwrap();

    assert!(scanner.next().is_none());
    assert_eq!(scanner.torn_tail(), Some(0));
}

#[test]
fn test_scan_ignores_appends_after_open() {
    let records = sample_records();
    let (_temp, _path, segment) = setup_segment_with(&records);

    let scanner = segment.scan().unwrap();
    segment.append(&Record::put(10, &b"late"[..], &b"x"[..])).unwrap();

    assert_eq!(scanner.map(|r| r.unwrap()).count(), records.len());
}

#[test]
fn test_short_read_inside_known_length_is_truncated_record() {
    let first = Record::put(1, &b"alpha"[..], &b"1"[..]);
    let second = Record::put(2, &b"beta"[..], vec![7u8; 512]);
    let (_temp, path, segment) = setup_segment_with(&[first.clone(), second.clone()]);
    let first_len = first.encoded_len();

    let mut scanner = segment.scan().unwrap();
    // Shrink the file under the open scan: the second header survives,
    // its body does not
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(first_len + HEADER_SIZE as u64 + 4).unwrap();
    drop(file);

    let (offset, record) = scanner.next().unwrap().unwrap();
    assert_eq!(offset, 0);
    assert_eq!(record, first);

    match scanner.next() {
        Some(Err(VaultError::TruncatedRecord {
            offset,
            needed,
            available,
        })) => {
            assert_eq!(offset, first_len);
            assert_eq!(needed, second.encoded_len());
            assert_eq!(available, second.encoded_len());
        }
        other => panic!("expected TruncatedRecord, got {:?}", other),
    }
    assert!(scanner.next().is_none());
    assert_eq!(scanner.torn_tail(), None);
}
