//! Write Buffer Module
//!
//! Batches writes in memory in front of the storage engine.
//!
//! ## Responsibilities
//! - Hold the latest pending value (or tombstone) per key
//! - Serve reads of pending writes before they reach disk
//! - Flush the batch once writes go idle for the save delay
//! - Flush inline on explicit save/close
//!
//! ## Data Structure Choice
//! A HashMap keyed by record key with a per-entry sequence number:
//! - Repeated writes to one key collapse to the last one
//! - The batch is applied in the order of each key's last write
//! - Swapped out wholesale under a short lock, so writes racing a flush land
//!   in the fresh map

mod pending;
mod timer;
mod write_buffer;

pub use pending::PendingMap;
pub use timer::DelayTimer;
pub use write_buffer::WriteBuffer;

use std::fmt;

use crate::error::{Result, StoreError};
use crate::storage::CachedValue;

/// Entry stored in the pending map
#[derive(Clone)]
pub enum PendingEntry {
    /// A value waiting to be written
    Value {
        /// Encoded payload, ready for the engine
        payload: Vec<u8>,
        /// The value itself, for read-your-writes and the engine cache
        value: CachedValue,
    },

    /// A pending delete
    Tombstone,
}

impl PendingEntry {
    pub fn is_tombstone(&self) -> bool {
        matches!(self, PendingEntry::Tombstone)
    }
}

impl fmt::Debug for PendingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingEntry::Value { payload, .. } => f
                .debug_struct("Value")
                .field("payload_len", &payload.len())
                .finish(),
            PendingEntry::Tombstone => f.write_str("Tombstone"),
        }
    }
}

/// Outcome of applying one pending batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Values written to the engine
    pub written: usize,
    /// Records actually removed
    pub deleted: usize,
    /// Entries whose write or delete failed (each one logged)
    pub failed: usize,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.written == 0 && self.deleted == 0 && self.failed == 0
    }

    /// The report itself, or `WriteFailed` if any entry failed
    pub fn into_result(self) -> Result<Self> {
        if self.failed > 0 {
            return Err(StoreError::WriteFailed {
                failed: self.failed,
            });
        }
        Ok(self)
    }
}
