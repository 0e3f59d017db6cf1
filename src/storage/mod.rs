//! Storage Module
//!
//! Single-file layout: fixed header, fixed-size index entries, then a
//! variable-size data region.
//!
//! ## Responsibilities
//! - Define the on-disk layout (all integers big-endian)
//! - Mirror the index in memory and keep it dense
//! - Place, relocate and reclaim record payloads
//! - Cache decoded values with explicit invalidation
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │ Header (16 bytes)                                      │
//! │   Version: i32 (4) | RecordCount: i32 (4)              │
//! │   DataStart: i64 (8)                                   │
//! ├────────────────────────────────────────────────────────┤
//! │ Index Region (48 bytes per entry, at 16 + 48·i)        │
//! │   Key: zero-padded (32)                                │
//! │   DataPointer: i64 (8) | Capacity: i32 (4)             │
//! │   Count: i32 (4)                                       │
//! │   ... RecordCount live entries, then free slots ...    │
//! ├────────────────────────────────────────────────────────┤
//! │ Data Region (starts at DataStart)                      │
//! │   Payloads addressed by DataPointer, each owning       │
//! │   Capacity bytes of which Count are used               │
//! └────────────────────────────────────────────────────────┘
//! ```

mod cache;
mod engine;
pub mod layout;
mod lock;
mod metadata;

pub use cache::{CachedValue, ValueCache};
pub use engine::{StorageEngine, MAX_PAYLOAD_SIZE};
pub use layout::FileHeader;
pub use lock::{LockKind, RangeLock};
pub use metadata::RecordMetadata;
