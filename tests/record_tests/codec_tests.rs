//! Tests for the record codec
//!
//! These tests verify:
//! - The fixed big-endian layout
//! - Tombstone handling (zero-length value)
//! - Error classification (CorruptHeader vs TruncatedRecord)
//! - Decoding from a buffer holding several records

use bytes::Bytes;
use logvault::record::{decode, encode, Entry, Record, RecordHeader, HEADER_SIZE};
use logvault::VaultError;
use proptest::prelude::*;

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_encode_layout_is_big_endian() {
    let record = Record::put(0x0102030405060708, &b"key"[..], &b"value"[..]);

    let bytes = encode(&record);

    assert_eq!(bytes.len(), HEADER_SIZE + 3 + 5);
    assert_eq!(&bytes[0..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(&bytes[8..12], &[0, 0, 0, 3]);
    assert_eq!(&bytes[12..16], &[0, 0, 0, 5]);
    assert_eq!(&bytes[16..19], b"key");
    assert_eq!(&bytes[19..], b"value");
}

#[test]
fn test_encoded_len_matches_encoding() {
    let record = Record::put(7, &b"hello"[..], vec![0xAB; 300]);
    assert_eq!(record.encoded_len(), encode(&record).len() as u64);

    let tombstone = Record::tombstone(7, &b"hello"[..]);
    assert_eq!(tombstone.encoded_len(), (HEADER_SIZE + 5) as u64);
}

#[test]
fn test_decode_put() {
    let record = Record::put(42, &b"hello"[..], &b"world"[..]);

    let (decoded, consumed) = decode(&encode(&record)).unwrap();

    assert_eq!(decoded, record);
    assert_eq!(consumed, HEADER_SIZE + 10);
    assert_eq!(decoded.value(), Some(&Bytes::from_static(b"world")));
}

#[test]
fn test_decode_empty_key() {
    let record = Record::put(1, Bytes::new(), &b"v"[..]);

    let (decoded, _) = decode(&encode(&record)).unwrap();

    assert!(decoded.key.is_empty());
    assert_eq!(decoded.value(), Some(&Bytes::from_static(b"v")));
}

// =============================================================================
// Tombstone Tests
// =============================================================================

#[test]
fn test_zero_length_value_decodes_to_tombstone() {
    let record = Record::tombstone(9, &b"gone"[..]);
    let bytes = encode(&record);

    assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);

    let (decoded, consumed) = decode(&bytes).unwrap();
    assert!(decoded.is_tombstone());
    assert_eq!(decoded.entry, Entry::Tombstone);
    assert_eq!(decoded.key.as_ref(), b"gone");
    assert_eq!(consumed, HEADER_SIZE + 4);
}

#[test]
fn test_put_with_empty_value_is_tombstone() {
    let record = Record::put(9, &b"k"[..], Bytes::new());

    assert!(record.is_tombstone());
    assert_eq!(record.value(), None);
}

// =============================================================================
// Error Classification Tests
// =============================================================================

#[test]
fn test_decode_short_header_is_corrupt_header() {
    let bytes = encode(&Record::put(1, &b"k"[..], &b"v"[..]));

    for len in 0..HEADER_SIZE {
        let result = decode(&bytes[..len]);
        assert!(
            matches!(result, Err(VaultError::CorruptHeader { .. })),
            "len {} should be a corrupt header",
            len
        );
    }
}

#[test]
fn test_decode_short_body_is_truncated_record() {
    let bytes = encode(&Record::put(1, &b"key"[..], &b"value"[..]));

    let result = decode(&bytes[..bytes.len() - 1]);

    match result {
        Err(VaultError::TruncatedRecord {
            needed, available, ..
        }) => {
            assert_eq!(needed, bytes.len() as u64);
            assert_eq!(available, bytes.len() as u64 - 1);
        }
        other => panic!("expected TruncatedRecord, got {:?}", other),
    }
}

#[test]
fn test_header_decode() {
    let bytes = encode(&Record::put(5, &b"ab"[..], &b"cde"[..]));

    let header = RecordHeader::decode(&bytes).unwrap();

    assert_eq!(header.timestamp, 5);
    assert_eq!(header.key_len, 2);
    assert_eq!(header.value_len, 3);
    assert_eq!(header.body_len(), 5);
    assert_eq!(header.record_len(), (HEADER_SIZE + 5) as u64);
    assert!(!header.is_tombstone());
}

// =============================================================================
// Stream Tests
// =============================================================================

#[test]
fn test_decode_consecutive_records() {
    let records = vec![
        Record::put(1, &b"a"[..], &b"1"[..]),
        Record::tombstone(2, &b"b"[..]),
        Record::put(3, &b"c"[..], vec![7u8; 1000]),
    ];
    let mut buf = Vec::new();
    for record in &records {
        buf.extend_from_slice(&encode(record));
    }

    let mut pos = 0;
    let mut decoded = Vec::new();
    while pos < buf.len() {
        let (record, consumed) = decode(&buf[pos..]).unwrap();
        decoded.push(record);
        pos += consumed;
    }

    assert_eq!(decoded, records);
}

#[test]
fn test_multi_megabyte_value() {
    let value = vec![0x5Au8; 4 * 1024 * 1024];
    let record = Record::put(11, &b"big"[..], value.clone());

    let (decoded, consumed) = decode(&encode(&record)).unwrap();

    assert_eq!(consumed, HEADER_SIZE + 3 + value.len());
    assert_eq!(decoded.value().map(|v| v.len()), Some(value.len()));
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #[test]
    fn prop_decode_inverts_encode(
        timestamp in any::<u64>(),
        key in proptest::collection::vec(any::<u8>(), 0..64),
        value in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let record = Record::put(timestamp, key, value);
        let bytes = encode(&record);

        let (decoded, consumed) = decode(&bytes).unwrap();

        prop_assert_eq!(consumed, bytes.len());
        prop_assert_eq!(decoded, record);
    }

    #[test]
    fn prop_decode_never_panics_on_garbage(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        match decode(&bytes) {
            Ok((_, consumed)) => prop_assert!(consumed <= bytes.len()),
            Err(VaultError::CorruptHeader { .. }) | Err(VaultError::TruncatedRecord { .. }) => {}
            Err(other) => prop_assert!(false, "unexpected error {:?}", other),
        }
    }
}
