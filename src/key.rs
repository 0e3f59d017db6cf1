//! Storage keys
//!
//! A key is an immutable byte string of at most [`KEY_SIZE`] bytes. On disk it
//! is zero-padded to a fixed slot, so the canonical form drops trailing zero
//! bytes: a key read back from its slot compares equal to the key written.

use std::fmt;

use bytes::Bytes;

use crate::error::{Result, StoreError};
use crate::storage::layout::KEY_SIZE;

/// Key of one stored record (content equality and hashing)
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey(Bytes);

impl StorageKey {
    /// Build a key, rejecting anything longer than the key slot
    pub fn new(bytes: impl AsRef<[u8]>) -> Result<Self> {
        let bytes = bytes.as_ref();
        if bytes.len() > KEY_SIZE {
            return Err(StoreError::InvalidKey {
                len: bytes.len(),
                max: KEY_SIZE,
            });
        }
        Ok(Self(Bytes::copy_from_slice(trim_padding(bytes))))
    }

    /// Rebuild a key from its zero-padded index slot
    pub fn from_slot(slot: &[u8; KEY_SIZE]) -> Self {
        Self(Bytes::copy_from_slice(trim_padding(slot)))
    }

    /// The zero-padded on-disk form
    pub fn to_slot(&self) -> [u8; KEY_SIZE] {
        let mut slot = [0u8; KEY_SIZE];
        slot[..self.0.len()].copy_from_slice(&self.0);
        slot
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn trim_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}

impl AsRef<[u8]> for StorageKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&str> for StorageKey {
    type Error = StoreError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&[u8]> for StorageKey {
    type Error = StoreError;

    fn try_from(value: &[u8]) -> Result<Self> {
        Self::new(value)
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({})", self)
    }
}

/// Printable keys render as text, everything else as hex
impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) if s.chars().all(|c| !c.is_control()) => write!(f, "{:?}", s),
            _ => {
                write!(f, "0x")?;
                for b in self.0.iter() {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}
