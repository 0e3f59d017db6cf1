//! File layout
//!
//! Byte offsets of the header, the fixed-size index entries, and the pointer
//! blocks inside them. Everything here is pure; all integers are big-endian.

/// Header size: Version (4) + RecordCount (4) + DataStart (8) = 16 bytes
pub const HEADER_SIZE: u64 = 16;

/// Offset of the format version (i32)
pub const VERSION_OFFSET: u64 = 0;

/// Offset of the record count (i32)
pub const RECORD_COUNT_OFFSET: u64 = 4;

/// Offset of the data-start pointer (i64)
pub const DATA_START_OFFSET: u64 = 8;

/// Length of the zero-padded key slot in an index entry
pub const KEY_SIZE: usize = 32;

/// Pointer block: DataPointer (8) + Capacity (4) + Count (4) = 16 bytes
pub const POINTER_BLOCK_SIZE: u64 = 16;

/// One index entry: key slot + pointer block = 48 bytes
pub const INDEX_ENTRY_SIZE: u64 = KEY_SIZE as u64 + POINTER_BLOCK_SIZE;

/// Index slots reserved when a fresh file is created
pub const INITIAL_INDEX_SLOTS: u32 = 4;

/// Offset of the key slot of index entry `slot`
pub const fn index_entry_offset(slot: u32) -> u64 {
    HEADER_SIZE + INDEX_ENTRY_SIZE * slot as u64
}

/// Offset of the pointer block of index entry `slot`
pub const fn data_block_offset(slot: u32) -> u64 {
    index_entry_offset(slot) + KEY_SIZE as u64
}

/// Decoded file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: i32,
    pub record_count: u32,
    pub data_start: u64,
}

impl FileHeader {
    /// Header written into a brand-new file
    pub fn fresh() -> Self {
        Self {
            version: 0,
            record_count: INITIAL_INDEX_SLOTS,
            data_start: index_entry_offset(INITIAL_INDEX_SLOTS),
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&self.version.to_be_bytes());
        buf[4..8].copy_from_slice(&(self.record_count as i32).to_be_bytes());
        buf[8..16].copy_from_slice(&(self.data_start as i64).to_be_bytes());
        buf
    }

    /// Negative counts or pointers read from a damaged file clamp to zero
    pub fn from_bytes(buf: &[u8; HEADER_SIZE as usize]) -> Self {
        let version = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let record_count = i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let mut data_start = [0u8; 8];
        data_start.copy_from_slice(&buf[8..16]);
        let data_start = i64::from_be_bytes(data_start);

        Self {
            version,
            record_count: record_count.max(0) as u32,
            data_start: data_start.max(0) as u64,
        }
    }
}
