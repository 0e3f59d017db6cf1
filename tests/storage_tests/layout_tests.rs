//! Layout Tests
//!
//! Tests verify:
//! - Header and index-entry offsets
//! - Header encode/decode (big-endian)
//! - Index entry encode/decode and non-live slot detection
//! - Key canonical form and length limit
//! - Bytes of a freshly created file

use std::fs;

use slotstore::storage::layout::{
    data_block_offset, index_entry_offset, FileHeader, HEADER_SIZE, INDEX_ENTRY_SIZE, INITIAL_INDEX_SLOTS,
    KEY_SIZE,
};
use slotstore::storage::RecordMetadata;
use slotstore::{Config, StorageKey, Store, StoreError};
use tempfile::TempDir;

// =============================================================================
// Offset Tests
// =============================================================================

#[test]
fn test_index_entry_offsets() {
    assert_eq!(index_entry_offset(0), 16);
    assert_eq!(index_entry_offset(1), 64);
    assert_eq!(index_entry_offset(3), 160);
    assert_eq!(index_entry_offset(4), 208);
}

#[test]
fn test_data_block_offsets() {
    assert_eq!(data_block_offset(0), 48);
    assert_eq!(data_block_offset(2), 16 + 48 * 2 + 32);
}

#[test]
fn test_entry_size_is_key_plus_pointer_block() {
    assert_eq!(INDEX_ENTRY_SIZE, KEY_SIZE as u64 + 16);
    assert_eq!(HEADER_SIZE, 16);
}

// =============================================================================
// Header Tests
// =============================================================================

#[test]
fn test_fresh_header() {
    let header = FileHeader::fresh();

    assert_eq!(header.version, 0);
    assert_eq!(header.record_count, INITIAL_INDEX_SLOTS);
    assert_eq!(header.data_start, 208);
}

#[test]
fn test_header_is_big_endian() {
    let header = FileHeader {
        version: 0x01020304,
        record_count: 5,
        data_start: 0x0A0B,
    };
    let bytes = header.to_bytes();

    assert_eq!(&bytes[0..4], &[1, 2, 3, 4]);
    assert_eq!(&bytes[4..8], &[0, 0, 0, 5]);
    assert_eq!(&bytes[8..16], &[0, 0, 0, 0, 0, 0, 0x0A, 0x0B]);
    assert_eq!(FileHeader::from_bytes(&bytes), header);
}

#[test]
fn test_header_negative_fields_clamp_to_zero() {
    let mut bytes = [0u8; 16];
    bytes[4..8].copy_from_slice(&(-3i32).to_be_bytes());
    bytes[8..16].copy_from_slice(&(-1i64).to_be_bytes());

    let header = FileHeader::from_bytes(&bytes);
    assert_eq!(header.record_count, 0);
    assert_eq!(header.data_start, 0);
}

// =============================================================================
// Index Entry Tests
// =============================================================================

#[test]
fn test_index_entry_layout() {
    let key = StorageKey::new("abc").unwrap();
    let meta = RecordMetadata::new(key.clone(), 2, 300, 25);
    let entry = meta.index_entry();

    assert_eq!(&entry[0..3], b"abc");
    assert!(entry[3..32].iter().all(|&b| b == 0));
    assert_eq!(&entry[32..40], &300i64.to_be_bytes());
    assert_eq!(&entry[40..44], &25i32.to_be_bytes());
    assert_eq!(&entry[44..48], &25i32.to_be_bytes());

    let decoded = RecordMetadata::from_index_entry(2, &entry).unwrap();
    assert_eq!(decoded, meta);
}

#[test]
fn test_zeroed_entry_is_not_live() {
    let entry = [0u8; 48];
    assert!(RecordMetadata::from_index_entry(0, &entry).is_none());
}

#[test]
fn test_entry_with_zero_count_is_not_live() {
    let key = StorageKey::new("k").unwrap();
    let mut entry = RecordMetadata::new(key, 0, 208, 10).index_entry();
    entry[44..48].copy_from_slice(&0i32.to_be_bytes());

    assert!(RecordMetadata::from_index_entry(0, &entry).is_none());
}

#[test]
fn test_entry_with_count_above_capacity_is_not_live() {
    let key = StorageKey::new("k").unwrap();
    let mut entry = RecordMetadata::new(key, 0, 208, 10).index_entry();
    entry[44..48].copy_from_slice(&11i32.to_be_bytes());

    assert!(RecordMetadata::from_index_entry(0, &entry).is_none());
}

#[test]
fn test_metadata_ranges() {
    let key = StorageKey::new("k").unwrap();
    let mut meta = RecordMetadata::new(key, 0, 100, 10);
    meta.data_count = 4;

    assert_eq!(meta.data_end(), 110);
    assert_eq!(meta.free_space(), 6);
    assert!(meta.contains_offset(100));
    assert!(meta.contains_offset(109));
    assert!(!meta.contains_offset(110));
    assert!(!meta.contains_offset(99));
}

// =============================================================================
// Key Tests
// =============================================================================

#[test]
fn test_key_length_limit() {
    assert!(StorageKey::new([b'x'; KEY_SIZE]).is_ok());

    let err = StorageKey::new([b'x'; KEY_SIZE + 1]).unwrap_err();
    assert!(matches!(err, StoreError::InvalidKey { len: 33, max: 32 }));
}

#[test]
fn test_key_round_trips_through_slot() {
    let key = StorageKey::new("user:42").unwrap();
    let slot = key.to_slot();

    assert_eq!(StorageKey::from_slot(&slot), key);
}

#[test]
fn test_key_trailing_zeros_are_padding() {
    let plain = StorageKey::new("ab").unwrap();
    let padded = StorageKey::new(b"ab\0\0").unwrap();

    assert_eq!(plain, padded);
    assert_eq!(padded.len(), 2);
}

#[test]
fn test_key_display() {
    assert_eq!(StorageKey::new("abc").unwrap().to_string(), "\"abc\"");
    assert_eq!(StorageKey::new([0x01u8, 0xff]).unwrap().to_string(), "0x01ff");
}

// =============================================================================
// Fresh File Tests
// =============================================================================

#[test]
fn test_fresh_file_bytes() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("fresh.db");

    let store = Store::open(Config::builder().path(&path).build()).unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 208);
    assert_eq!(&bytes[4..8], &4i32.to_be_bytes());

    store.close().unwrap();

    // Close persists the live record count
    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 208);
    assert_eq!(&bytes[4..8], &0i32.to_be_bytes());
    assert_eq!(&bytes[0..4], &0i32.to_be_bytes());
    assert_eq!(&bytes[8..16], &208i64.to_be_bytes());
    assert!(bytes[16..].iter().all(|&b| b == 0));
}

#[test]
fn test_open_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("dir").join("store.db");

    let store = Store::open(Config::builder().path(&path).build()).unwrap();
    store.close().unwrap();

    assert!(path.exists());
}
