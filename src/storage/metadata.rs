//! Record metadata
//!
//! In-memory mirror of one index entry: which slot it lives in and where its
//! payload sits in the data region.

use crate::key::StorageKey;

use super::layout::{INDEX_ENTRY_SIZE, KEY_SIZE, POINTER_BLOCK_SIZE};

/// Descriptor of one stored record
///
/// `data_count <= data_capacity` always holds; the bytes between count and
/// capacity are reserved for in-place growth of this record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMetadata {
    /// Key of the record
    pub key: StorageKey,
    /// Ordinal slot in the index region
    pub index_position: u32,
    /// File offset of the first payload byte
    pub data_pointer: u64,
    /// Bytes reserved for the payload
    pub data_capacity: u32,
    /// Bytes actually used by the payload
    pub data_count: u32,
}

impl RecordMetadata {
    /// New record occupying exactly `size` bytes at `data_pointer`
    pub fn new(key: StorageKey, index_position: u32, data_pointer: u64, size: u32) -> Self {
        Self {
            key,
            index_position,
            data_pointer,
            data_capacity: size,
            data_count: size,
        }
    }

    /// One past the last reserved byte
    pub fn data_end(&self) -> u64 {
        self.data_pointer + self.data_capacity as u64
    }

    pub fn free_space(&self) -> u32 {
        self.data_capacity - self.data_count
    }

    /// Whether the file offset falls inside this record's reserved range
    pub fn contains_offset(&self, offset: u64) -> bool {
        offset >= self.data_pointer && offset < self.data_end()
    }

    pub fn pointer_block(&self) -> [u8; POINTER_BLOCK_SIZE as usize] {
        let mut buf = [0u8; POINTER_BLOCK_SIZE as usize];
        buf[0..8].copy_from_slice(&(self.data_pointer as i64).to_be_bytes());
        buf[8..12].copy_from_slice(&(self.data_capacity as i32).to_be_bytes());
        buf[12..16].copy_from_slice(&(self.data_count as i32).to_be_bytes());
        buf
    }

    pub fn index_entry(&self) -> [u8; INDEX_ENTRY_SIZE as usize] {
        let mut buf = [0u8; INDEX_ENTRY_SIZE as usize];
        buf[..KEY_SIZE].copy_from_slice(&self.key.to_slot());
        buf[KEY_SIZE..].copy_from_slice(&self.pointer_block());
        buf
    }

    /// Parse the entry read from `slot`
    ///
    /// Returns `None` for a zeroed or otherwise non-live entry: a zero pointer,
    /// capacity or count (or a negative one) marks the end of the live index.
    pub fn from_index_entry(slot: u32, buf: &[u8; INDEX_ENTRY_SIZE as usize]) -> Option<Self> {
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&buf[..KEY_SIZE]);

        let block = &buf[KEY_SIZE..];
        let data_pointer = i64::from_be_bytes(block[0..8].try_into().ok()?);
        let data_capacity = i32::from_be_bytes(block[8..12].try_into().ok()?);
        let data_count = i32::from_be_bytes(block[12..16].try_into().ok()?);

        if data_pointer <= 0 || data_capacity <= 0 || data_count <= 0 || data_count > data_capacity
        {
            return None;
        }

        Some(Self {
            key: StorageKey::from_slot(&key),
            index_position: slot,
            data_pointer: data_pointer as u64,
            data_capacity: data_capacity as u32,
            data_count: data_count as u32,
        })
    }
}
