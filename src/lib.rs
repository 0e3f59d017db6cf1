//! # slotstore
//!
//! An embedded, single-file key-value store with:
//! - A fixed-slot index at the front of the file, data region behind it
//! - In-place overwrites and free-space reclamation without a separate
//!   compaction pass
//! - Coalesced, delayed writes flushed once writes go idle
//! - Pluggable value serialization with optional compression
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageRegistry                          │
//! │              (path → shared Store, refcounted)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                         Store                                │
//! │          (key validation, open/closed lifecycle)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      WriteBuffer                             │
//! │     (pending map, last write wins, idle-delay timer)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ flush (batch)
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     StorageEngine                            │
//! │   (header + index slots + data region, value cache)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use slotstore::{Config, Store};
//!
//! let store = Store::open(Config::builder().path("app.db").build())?;
//! store.put("greeting", String::from("hello"))?;
//! store.save()?;
//! assert_eq!(store.get::<String>("greeting")?.as_deref(), Some("hello"));
//! store.close()?;
//! # Ok::<(), slotstore::StoreError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod key;

pub mod codec;
pub mod storage;
pub mod buffer;
pub mod store;
pub mod registry;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::{Compression, Config, ConfigBuilder};
pub use key::StorageKey;
pub use codec::{BincodeSerializer, JsonSerializer, PayloadCodec, Serializer};
pub use storage::{RecordMetadata, StorageEngine};
pub use buffer::{FlushReport, WriteBuffer};
pub use store::Store;
pub use registry::StorageRegistry;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of slotstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
