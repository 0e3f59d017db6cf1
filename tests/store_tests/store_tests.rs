//! Tests for Store
//!
//! These tests verify:
//! - Basic get/put/delete/contains operations
//! - get_or_put defaults
//! - Save, close and reopen lifecycle
//! - Key validation and closed-storage errors
//! - Read-only stores
//! - Alternate serializers and compression
//! - Concurrent access through a shared handle

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use slotstore::{Compression, Config, JsonSerializer, Store, StoreError};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Settings {
    theme: String,
    font_size: u16,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn config_for(temp_dir: &TempDir) -> Config {
    Config::builder()
        .path(temp_dir.path().join("store.db"))
        .save_delay_ms(60_000)
        .build()
}

fn setup_temp_store() -> (TempDir, Store) {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(config_for(&temp_dir)).unwrap();
    (temp_dir, store)
}

fn reopen(temp_dir: &TempDir) -> Store {
    Store::open(config_for(temp_dir)).unwrap()
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_put_get() {
    let (_temp, store) = setup_temp_store();

    store.put("hello", String::from("world")).unwrap();

    assert_eq!(store.get::<String>("hello").unwrap(), Some("world".to_string()));
}

#[test]
fn test_get_nonexistent_key() {
    let (_temp, store) = setup_temp_store();

    assert_eq!(store.get::<String>("missing").unwrap(), None);
}

#[test]
fn test_struct_values() {
    let (_temp, store) = setup_temp_store();
    let settings = Settings {
        theme: "dark".to_string(),
        font_size: 14,
    };

    store.put("settings", settings.clone()).unwrap();
    store.save().unwrap();

    assert_eq!(store.get::<Settings>("settings").unwrap(), Some(settings));
}

#[test]
fn test_delete_reports_presence() {
    let (_temp, store) = setup_temp_store();

    store.put("a", 1u32).unwrap();
    assert!(store.delete("a").unwrap());
    assert!(!store.delete("a").unwrap());
    assert!(!store.contains("a").unwrap());
}

#[test]
fn test_contains_sees_pending_and_saved() {
    let (_temp, store) = setup_temp_store();

    store.put("a", 1u32).unwrap();
    assert!(store.contains("a").unwrap());

    store.save().unwrap();
    assert!(store.contains("a").unwrap());
}

#[test]
fn test_str_value_reads_back_as_string() {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(config_for(&temp_dir)).unwrap();

    store.put("a", "x").unwrap();
    assert_eq!(store.get::<String>("a").unwrap(), Some("x".to_string()));

    store.save().unwrap();
    assert_eq!(store.get::<String>("a").unwrap(), Some("x".to_string()));
    store.close().unwrap();

    let store = reopen(&temp_dir);
    assert_eq!(store.get::<String>("a").unwrap(), Some("x".to_string()));
}

#[test]
fn test_byte_keys() {
    let (_temp, store) = setup_temp_store();

    store.put([0xFFu8, 0x00, 0x01], 3u8).unwrap();

    assert_eq!(store.get::<u8>([0xFFu8, 0x00, 0x01]).unwrap(), Some(3));
}

// =============================================================================
// get_or_put Tests
// =============================================================================

#[test]
fn test_get_or_put_persists_default() {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(config_for(&temp_dir)).unwrap();

    let value = store.get_or_put("counter", 10u64).unwrap();
    assert_eq!(value, 10);
    assert!(!store.has_pending_writes().unwrap());
    drop(store);

    let store = reopen(&temp_dir);
    assert_eq!(store.get::<u64>("counter").unwrap(), Some(10));
}

#[test]
fn test_get_or_put_returns_existing() {
    let (_temp, store) = setup_temp_store();

    store.put("counter", 3u64).unwrap();

    assert_eq!(store.get_or_put("counter", 10u64).unwrap(), 3);
}

#[test]
fn test_get_or_put_type_mismatch() {
    let (_temp, store) = setup_temp_store();

    store.put("counter", String::from("three")).unwrap();
    store.save().unwrap();

    let result = store.get_or_put("counter", 10u64);
    assert!(matches!(result, Err(StoreError::TypeMismatch { .. })));
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_save_close_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(config_for(&temp_dir)).unwrap();

    store.put("a", String::from("x")).unwrap();
    store.put("b", String::from("y")).unwrap();
    store.save().unwrap();
    store.close().unwrap();

    let store = reopen(&temp_dir);
    assert_eq!(store.get::<String>("a").unwrap(), Some("x".to_string()));
    assert_eq!(store.get::<String>("b").unwrap(), Some("y".to_string()));
    assert_eq!(store.size().unwrap(), 2);
}

#[test]
fn test_close_flushes_pending_writes() {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(config_for(&temp_dir)).unwrap();

    store.put("a", 1u8).unwrap();
    store.close().unwrap();

    let store = reopen(&temp_dir);
    assert_eq!(store.get::<u8>("a").unwrap(), Some(1));
}

#[test]
fn test_drop_closes_store() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = Store::open(config_for(&temp_dir)).unwrap();
        store.put("a", 1u8).unwrap();
    }

    let store = reopen(&temp_dir);
    assert_eq!(store.get::<u8>("a").unwrap(), Some(1));
}

#[test]
fn test_closed_store_rejects_operations() {
    let (_temp, store) = setup_temp_store();
    store.close().unwrap();

    assert!(!store.is_open());
    assert!(matches!(store.get::<u8>("a"), Err(StoreError::ClosedStorage)));
    assert!(matches!(store.put("a", 1u8), Err(StoreError::ClosedStorage)));
    assert!(matches!(store.delete("a"), Err(StoreError::ClosedStorage)));
    assert!(matches!(store.contains("a"), Err(StoreError::ClosedStorage)));
    assert!(matches!(store.size(), Err(StoreError::ClosedStorage)));
    assert!(matches!(store.save(), Err(StoreError::ClosedStorage)));
    assert!(matches!(store.version(), Err(StoreError::ClosedStorage)));
    assert!(matches!(store.close(), Err(StoreError::ClosedStorage)));
}

#[test]
fn test_size_flushes_pending_writes() {
    let (_temp, store) = setup_temp_store();

    store.put("a", 1u8).unwrap();
    store.put("b", 2u8).unwrap();
    store.delete("a").unwrap();

    assert_eq!(store.size().unwrap(), 1);
    assert!(!store.has_pending_writes().unwrap());
}

#[test]
fn test_file_size_tracks_contents() {
    let (_temp, store) = setup_temp_store();
    assert_eq!(store.file_size().unwrap(), 208);

    store.put("a", vec![0u8; 100]).unwrap();
    let grown = store.file_size().unwrap();
    assert!(grown > 308);

    store.delete("a").unwrap();
    assert_eq!(store.file_size().unwrap(), 208);
}

#[test]
fn test_version_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(config_for(&temp_dir)).unwrap();

    assert_eq!(store.version().unwrap(), 0);
    store.set_version(12).unwrap();
    store.close().unwrap();

    let store = reopen(&temp_dir);
    assert_eq!(store.version().unwrap(), 12);
}

#[test]
fn test_save_delay_accessors() {
    let (_temp, store) = setup_temp_store();
    assert_eq!(store.save_delay(), Duration::from_secs(60));

    store.set_save_delay(Duration::from_millis(250)).unwrap();
    assert_eq!(store.save_delay(), Duration::from_millis(250));
}

#[test]
fn test_path_accessor() {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(config_for(&temp_dir)).unwrap();

    assert_eq!(store.path(), temp_dir.path().join("store.db"));
}

// =============================================================================
// Key Validation Tests
// =============================================================================

#[test]
fn test_key_too_long_rejected() {
    let (_temp, store) = setup_temp_store();
    let long_key = "k".repeat(33);

    assert!(matches!(store.put(&long_key, 1u8), Err(StoreError::InvalidKey { len: 33, .. })));
    assert!(matches!(store.get::<u8>(&long_key), Err(StoreError::InvalidKey { .. })));
    assert_eq!(store.size().unwrap(), 0);
}

#[test]
fn test_full_length_key_accepted() {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(config_for(&temp_dir)).unwrap();
    let full_key = "k".repeat(32);

    store.put(&full_key, 1u8).unwrap();
    store.close().unwrap();

    let store = reopen(&temp_dir);
    assert_eq!(store.get::<u8>(&full_key).unwrap(), Some(1));
}

// =============================================================================
// Read-Only Tests
// =============================================================================

#[test]
fn test_read_only_store() {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open(config_for(&temp_dir)).unwrap();
    store.put("a", 1u8).unwrap();
    store.close().unwrap();

    let config = Config::builder()
        .path(temp_dir.path().join("store.db"))
        .read_only(true)
        .build();
    let store = Store::open(config).unwrap();

    assert!(store.is_read_only());
    assert_eq!(store.get::<u8>("a").unwrap(), Some(1));
    assert!(store.contains("a").unwrap());
    assert!(matches!(store.put("b", 2u8), Err(StoreError::ReadOnly)));
    assert!(matches!(store.delete("a"), Err(StoreError::ReadOnly)));
    assert!(matches!(store.set_version(1), Err(StoreError::ReadOnly)));

    // Defaults are handed back without being stored
    assert_eq!(store.get_or_put("b", 7u8).unwrap(), 7);
    assert!(!store.contains("b").unwrap());
}

// =============================================================================
// Serializer / Compression Tests
// =============================================================================

#[test]
fn test_json_serializer_store() {
    let temp_dir = TempDir::new().unwrap();
    let settings = Settings {
        theme: "light".to_string(),
        font_size: 11,
    };

    let store = Store::open_with_serializer(config_for(&temp_dir), JsonSerializer).unwrap();
    store.put("settings", settings.clone()).unwrap();
    store.close().unwrap();

    let store = Store::open_with_serializer(config_for(&temp_dir), JsonSerializer).unwrap();
    assert_eq!(store.get::<Settings>("settings").unwrap(), Some(settings));

    let raw = store.get_raw("settings").unwrap().unwrap();
    assert!(String::from_utf8_lossy(&raw).contains("\"theme\":\"light\""));
}

#[test]
fn test_compressed_store_readable_without_compression() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .path(temp_dir.path().join("store.db"))
        .compression(Compression::Deflate { level: 7 })
        .build();

    let store = Store::open(config).unwrap();
    store.put("blob", vec![7u8; 10_000]).unwrap();
    store.save().unwrap();
    assert!(store.file_size().unwrap() < 1_000);
    store.close().unwrap();

    let store = reopen(&temp_dir);
    assert_eq!(store.get::<Vec<u8>>("blob").unwrap(), Some(vec![7u8; 10_000]));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_readers_and_writers() {
    let (_temp, store) = setup_temp_store();
    let store = Arc::new(store);

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..25u32 {
                    store.put(format!("w{}-{}", t, i), i).unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..25u32 {
                    let _ = store.get::<u32>(format!("w0-{}", i)).unwrap();
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    assert_eq!(store.size().unwrap(), 100);
    assert_eq!(store.get::<u32>("w3-24").unwrap(), Some(24));
}
