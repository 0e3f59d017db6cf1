//! Storage Engine
//!
//! Owns the backing file and its in-memory mirror.
//!
//! ## Responsibilities
//! - Create or open the file and rebuild the index from the index region
//! - Serve reads through the value cache, falling back to the data region
//! - Write payloads in place, relocate them when they outgrow their capacity
//! - Grow the index region by relocating the payloads in its way
//! - Reclaim freed ranges (truncate, merge backward, or absorb into the index)
//! - Keep index slots dense by moving the last entry into a deleted slot
//!
//! ## Invariants
//! - Slots `0..record_count` hold live records; no tombstones
//! - Header, index region and data region never overlap
//! - Reserved data ranges never overlap
//! - The file never ends in bytes no record uses
//!
//! Not thread-safe on its own: callers serialize access (the write buffer
//! keeps the engine behind a mutex).

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::{BincodeSerializer, PayloadCodec, Serializer};
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::key::StorageKey;

use super::cache::{CachedValue, ValueCache};
use super::layout::{
    data_block_offset, index_entry_offset, FileHeader, DATA_START_OFFSET, HEADER_SIZE,
    INDEX_ENTRY_SIZE, INITIAL_INDEX_SLOTS, RECORD_COUNT_OFFSET, VERSION_OFFSET,
};
use super::lock::{LockKind, RangeLock};
use super::metadata::RecordMetadata;

/// Largest payload a record can hold (the count field is a signed 32-bit int)
pub const MAX_PAYLOAD_SIZE: usize = i32::MAX as usize;

/// The single-file storage engine
pub struct StorageEngine<S = BincodeSerializer> {
    /// Backing file path
    path: PathBuf,

    /// Open file handle; `None` once closed
    file: Option<File>,

    /// Payload encoder/decoder shared with the write buffer
    codec: Arc<PayloadCodec<S>>,

    /// Take advisory range locks around every access
    locking: bool,

    /// Opened without write access
    read_only: bool,

    /// Extra slots reserved on growth, as a fraction of the record count
    growth_weight: f32,

    /// Header fields as last written
    header: FileHeader,

    /// Key → record descriptor
    index: HashMap<StorageKey, RecordMetadata>,

    /// Slot → key; `slots[i]` is the record in index slot `i`
    slots: Vec<StorageKey>,

    /// Recently read or written values
    cache: ValueCache,
}

impl<S: Serializer> StorageEngine<S> {
    /// Open or create the storage file named by `config.path`
    ///
    /// A file no longer than the header is initialized: version 0, four empty
    /// index slots, data region starting right after them. Otherwise the index
    /// is rebuilt by scanning slots until the first one that is not a live
    /// record; everything from that slot on is treated as absent.
    pub fn open(config: &Config, codec: Arc<PayloadCodec<S>>) -> Result<Self> {
        config.validate()?;

        if !config.read_only {
            if let Some(parent) = config.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(!config.read_only)
            .create(!config.read_only)
            .open(&config.path)?;
        let file_len = file.metadata()?.len();

        let mut engine = Self {
            path: config.path.clone(),
            file: Some(file),
            codec,
            locking: config.file_locking,
            read_only: config.read_only,
            growth_weight: config.growth_weight,
            header: FileHeader::fresh(),
            index: HashMap::new(),
            slots: Vec::new(),
            cache: ValueCache::new(config.cache_capacity),
        };

        if file_len <= HEADER_SIZE {
            if !engine.read_only {
                let header = engine.header;
                engine.write_at(VERSION_OFFSET, &header.to_bytes())?;
                engine.set_len(header.data_start)?;
            }
            info!(path = %engine.path.display(), "initialized new storage file");
            return Ok(engine);
        }

        let mut buf = [0u8; HEADER_SIZE as usize];
        engine.read_at(VERSION_OFFSET, &mut buf)?;
        engine.header = FileHeader::from_bytes(&buf);
        engine.rebuild_index(file_len)?;

        info!(
            path = %engine.path.display(),
            records = engine.slots.len(),
            version = engine.header.version,
            "opened storage file"
        );
        Ok(engine)
    }

    /// Scan index slots `0..record_count`, stopping at the first non-live one
    fn rebuild_index(&mut self, file_len: u64) -> Result<()> {
        let declared = self.header.record_count;

        for slot in 0..declared {
            if index_entry_offset(slot + 1) > self.header.data_start {
                break;
            }

            let mut entry = [0u8; INDEX_ENTRY_SIZE as usize];
            match self.read_at(index_entry_offset(slot), &mut entry) {
                Ok(()) => {}
                Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }

            let Some(meta) = RecordMetadata::from_index_entry(slot, &entry) else {
                break;
            };
            if meta.data_pointer < self.header.data_start
                || meta.data_end() > file_len
                || self.index.contains_key(&meta.key)
            {
                break;
            }

            self.slots.push(meta.key.clone());
            self.index.insert(meta.key.clone(), meta);
        }

        let pristine = declared == INITIAL_INDEX_SLOTS && self.slots.is_empty();
        if (self.slots.len() as u32) < declared && !pristine {
            warn!(
                path = %self.path.display(),
                declared,
                recovered = self.slots.len(),
                "index scan stopped early; trailing entries treated as absent"
            );
        }
        self.header.record_count = self.slots.len() as u32;
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Whether a record exists for `key`
    pub fn contains(&self, key: &StorageKey) -> bool {
        self.index.contains_key(key)
    }

    /// Read the value stored under `key`
    ///
    /// Served from the cache when it holds a value of type `T`; otherwise the
    /// payload is read and decoded, and the result becomes the cached value.
    pub fn get<T>(&mut self, key: &StorageKey) -> Result<Option<Arc<T>>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.ensure_open()?;

        let Some(meta) = self.index.get(key) else {
            return Ok(None);
        };
        let (pointer, count) = (meta.data_pointer, meta.data_count);

        if let Some(cached) = self.cache.get(key) {
            if let Ok(value) = cached.downcast::<T>() {
                return Ok(Some(value));
            }
        }

        let payload = self.read_payload(pointer, count)?;
        let value: Arc<T> = Arc::new(self.codec.decode(&payload)?);
        self.cache.insert(key.clone(), value.clone());

        Ok(Some(value))
    }

    /// Raw payload bytes stored under `key` (bypasses the cache)
    pub fn get_raw(&mut self, key: &StorageKey) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;

        let Some(meta) = self.index.get(key) else {
            return Ok(None);
        };
        let (pointer, count) = (meta.data_pointer, meta.data_count);
        self.read_payload(pointer, count).map(Some)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Encode and store `value` under `key`
    pub fn put<T>(&mut self, key: &StorageKey, value: T) -> Result<()>
    where
        T: Serialize + Send + Sync + 'static,
    {
        let payload = self.codec.encode(&value)?;
        let cached: CachedValue = Arc::new(value);
        self.put_payload(key, &payload, Some(cached))
    }

    /// Store an already-encoded payload under `key`
    ///
    /// - Existing record, payload fits: overwrite in place
    /// - Existing record, payload too big: free the old range, append at EOF
    /// - New key: grow the index if needed, append entry and payload
    ///
    /// `value` (the decoded form of `payload`) replaces the cached value;
    /// without one the cache entry is dropped.
    pub fn put_payload(
        &mut self,
        key: &StorageKey,
        payload: &[u8],
        value: Option<CachedValue>,
    ) -> Result<()> {
        self.ensure_writable()?;
        let size = payload_size(payload)?;

        match self.index.get(key).cloned() {
            Some(meta) if size <= meta.data_capacity => self.overwrite_in_place(meta, payload, size)?,
            Some(meta) => self.relocate(meta, payload, size)?,
            None => self.insert_new(key, payload, size)?,
        }

        match value {
            Some(value) => self.cache.insert(key.clone(), value),
            None => self.cache.invalidate(key),
        }
        Ok(())
    }

    fn overwrite_in_place(&mut self, mut meta: RecordMetadata, payload: &[u8], size: u32) -> Result<()> {
        let at_tail = meta.data_end() >= self.file_len()?;

        self.write_at(meta.data_pointer, payload)?;
        meta.data_count = size;

        // The tail record keeps no spare capacity past end-of-file
        if at_tail && meta.data_capacity > size {
            meta.data_capacity = size;
            self.write_pointer_block(&meta)?;
            self.set_len(meta.data_end())?;
        } else {
            self.write_pointer_block(&meta)?;
        }

        debug!(key = %meta.key, offset = meta.data_pointer, size, "overwrote record in place");
        self.index.insert(meta.key.clone(), meta);
        Ok(())
    }

    fn relocate(&mut self, mut meta: RecordMetadata, payload: &[u8], size: u32) -> Result<()> {
        let old_pointer = meta.data_pointer;
        self.free_data_range(&meta)?;

        let pointer = self.append_offset()?;
        self.write_at(pointer, payload)?;

        meta.data_pointer = pointer;
        meta.data_capacity = size;
        meta.data_count = size;
        self.write_pointer_block(&meta)?;

        debug!(key = %meta.key, from = old_pointer, to = pointer, size, "relocated record");
        self.index.insert(meta.key.clone(), meta);
        Ok(())
    }

    fn insert_new(&mut self, key: &StorageKey, payload: &[u8], size: u32) -> Result<()> {
        let slot = self.slots.len() as u32;
        self.ensure_index_capacity()?;

        let pointer = self.append_offset()?;
        self.write_at(pointer, payload)?;

        let meta = RecordMetadata::new(key.clone(), slot, pointer, size);
        self.write_at(index_entry_offset(slot), &meta.index_entry())?;

        self.slots.push(key.clone());
        self.index.insert(key.clone(), meta);
        self.write_record_count()?;

        debug!(key = %key, slot, offset = pointer, size, "inserted record");
        Ok(())
    }

    /// Remove the record for `key`
    ///
    /// Returns `Ok(false)` when the key is absent. A failure partway leaves
    /// the file and the in-memory index possibly out of step; nothing is
    /// rolled back.
    pub fn delete(&mut self, key: &StorageKey) -> Result<bool> {
        self.ensure_writable()?;

        let Some(meta) = self.index.get(key).cloned() else {
            return Ok(false);
        };

        self.free_data_range(&meta)?;

        // Keep slots dense: the last entry fills the hole
        let last = self.slots.len() as u32 - 1;
        if meta.index_position != last {
            let moved_key = self.slots[last as usize].clone();
            if let Some(mut moved) = self.index.get(&moved_key).cloned() {
                moved.index_position = meta.index_position;
                self.write_at(index_entry_offset(meta.index_position), &moved.index_entry())?;
                self.index.insert(moved_key, moved);
            }
        }
        self.write_at(index_entry_offset(last), &[0u8; INDEX_ENTRY_SIZE as usize])?;

        self.slots.swap_remove(meta.index_position as usize);
        self.index.remove(key);
        self.cache.invalidate(key);
        self.write_record_count()?;
        self.trim_tail()?;

        debug!(key = %key, slot = meta.index_position, "deleted record");
        Ok(true)
    }

    // =========================================================================
    // Space Management
    // =========================================================================

    /// Release the data range of `freed`
    ///
    /// 1. Range ends the file: truncate.
    /// 2. A record ends right before it: that record absorbs the range.
    /// 3. Nothing lies below it: the data region now starts at the next
    ///    record, handing the range to the index region.
    ///
    /// Any other gap is left in place until index growth compacts past it.
    fn free_data_range(&mut self, freed: &RecordMetadata) -> Result<()> {
        let file_len = self.file_len()?;
        let (start, end) = (freed.data_pointer, freed.data_end());

        if end >= file_len {
            self.set_len(start)?;
            debug!(offset = start, "truncated freed tail range");
            return Ok(());
        }

        if let Some(mut previous) = self.record_containing(start.wrapping_sub(1), &freed.key) {
            let merged = previous
                .data_capacity
                .checked_add(freed.data_capacity)
                .filter(|&capacity| capacity as usize <= MAX_PAYLOAD_SIZE);

            if let Some(capacity) = merged {
                previous.data_capacity = capacity;
                self.write_pointer_block(&previous)?;
                debug!(into = %previous.key, offset = start, len = freed.data_capacity, "merged freed range backward");
                self.index.insert(previous.key.clone(), previous);
            } else {
                debug!(offset = start, len = freed.data_capacity, "freed range too large to merge; left as gap");
            }
            return Ok(());
        }

        let records_below = self
            .index
            .values()
            .any(|m| m.key != freed.key && m.data_pointer < start);
        if records_below {
            debug!(offset = start, len = freed.data_capacity, "freed range left as gap");
            return Ok(());
        }

        let next_start = self
            .index
            .values()
            .filter(|m| m.key != freed.key && m.data_pointer >= end)
            .map(|m| m.data_pointer)
            .min();
        if let Some(next_start) = next_start {
            self.write_data_start(next_start)?;
            debug!(data_start = next_start, "front range handed to index region");
        }
        Ok(())
    }

    /// Make room in the index region for one more entry
    ///
    /// Growth targets `count + 1 + count * weight` slots. The new boundary is
    /// never below the current file length, so every payload is moved (and
    /// compacted to its count) past it, in address order.
    fn ensure_index_capacity(&mut self) -> Result<()> {
        let count = self.slots.len() as u32;
        let needed_end = index_entry_offset(count + 1);
        if needed_end < self.header.data_start {
            return Ok(());
        }

        if count == 0 {
            self.set_len(needed_end)?;
            self.write_data_start(needed_end)?;
            debug!(data_start = needed_end, "extended empty index region");
            return Ok(());
        }

        let target = count + 1 + (count as f32 * self.growth_weight) as u32;
        let boundary = index_entry_offset(target).max(self.file_len()?);

        let mut movers: Vec<RecordMetadata> = self
            .index
            .values()
            .filter(|m| m.data_pointer < boundary)
            .cloned()
            .collect();
        movers.sort_by_key(|m| m.data_pointer);

        let mut cursor = boundary;
        for mut meta in movers {
            let payload = self.read_payload(meta.data_pointer, meta.data_count)?;
            self.write_at(cursor, &payload)?;

            meta.data_pointer = cursor;
            meta.data_capacity = meta.data_count;
            self.write_pointer_block(&meta)?;

            cursor += meta.data_count as u64;
            self.index.insert(meta.key.clone(), meta);
        }
        self.set_len(cursor)?;
        self.write_data_start(boundary)?;

        debug!(
            path = %self.path.display(),
            slots = (boundary - HEADER_SIZE) / INDEX_ENTRY_SIZE,
            data_start = boundary,
            "grew index region"
        );
        Ok(())
    }

    /// Cut unused bytes off the end of the file
    fn trim_tail(&mut self) -> Result<()> {
        let file_len = self.file_len()?;
        let top = self.index.values().max_by_key(|m| m.data_pointer).cloned();

        let used_end = match top {
            Some(mut top) => {
                if top.data_capacity > top.data_count {
                    top.data_capacity = top.data_count;
                    self.write_pointer_block(&top)?;
                }
                let end = top.data_end();
                self.index.insert(top.key.clone(), top);
                end
            }
            None => self.header.data_start,
        };

        if used_end < file_len {
            self.set_len(used_end)?;
        }
        Ok(())
    }

    /// Record (other than `exclude`) whose reserved range holds `offset`
    fn record_containing(&self, offset: u64, exclude: &StorageKey) -> Option<RecordMetadata> {
        self.index
            .values()
            .find(|m| &m.key != exclude && m.contains_offset(offset))
            .cloned()
    }

    /// Where the next appended payload goes
    fn append_offset(&mut self) -> Result<u64> {
        let file_len = self.file_len()?;
        if file_len < self.header.data_start {
            self.set_len(self.header.data_start)?;
            return Ok(self.header.data_start);
        }
        Ok(file_len)
    }

    // =========================================================================
    // Header
    // =========================================================================

    /// Number of live records
    pub fn size(&self) -> usize {
        self.index.len()
    }

    pub fn version(&self) -> i32 {
        self.header.version
    }

    pub fn set_version(&mut self, version: i32) -> Result<()> {
        self.ensure_writable()?;
        self.write_at(VERSION_OFFSET, &version.to_be_bytes())?;
        self.header.version = version;
        Ok(())
    }

    /// Length of the backing file in bytes
    pub fn file_size(&self) -> Result<u64> {
        self.file_len()
    }

    /// Persist the header, fsync and release the file handle
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;

        if !self.read_only {
            self.header.record_count = self.slots.len() as u32;
            let header = self.header;
            self.write_at(VERSION_OFFSET, &header.to_bytes())?;
            if let Some(file) = self.file.as_ref() {
                file.sync_all()?;
            }
        }

        self.file = None;
        self.index.clear();
        self.slots.clear();
        self.cache.clear();

        info!(path = %self.path.display(), "closed storage file");
        Ok(())
    }

    fn write_record_count(&mut self) -> Result<()> {
        let count = self.slots.len() as u32;
        self.write_at(RECORD_COUNT_OFFSET, &(count as i32).to_be_bytes())?;
        self.header.record_count = count;
        Ok(())
    }

    fn write_data_start(&mut self, data_start: u64) -> Result<()> {
        self.write_at(DATA_START_OFFSET, &(data_start as i64).to_be_bytes())?;
        self.header.data_start = data_start;
        Ok(())
    }

    fn write_pointer_block(&mut self, meta: &RecordMetadata) -> Result<()> {
        self.write_at(data_block_offset(meta.index_position), &meta.pointer_block())
    }

    // =========================================================================
    // Raw File Access
    // =========================================================================

    fn read_payload(&mut self, pointer: u64, count: u32) -> Result<Vec<u8>> {
        let mut payload = vec![0u8; count as usize];
        self.read_at(pointer, &mut payload)?;
        Ok(payload)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let locking = self.locking;
        let file = self.file.as_mut().ok_or(StoreError::ClosedStorage)?;

        let _lock = RangeLock::acquire(file, offset, buf.len() as u64, LockKind::Shared, locking)?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let locking = self.locking;
        let file = self.file.as_mut().ok_or(StoreError::ClosedStorage)?;

        let _lock = RangeLock::acquire(file, offset, bytes.len() as u64, LockKind::Exclusive, locking)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        Ok(())
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        let locking = self.locking;
        let file = self.file.as_mut().ok_or(StoreError::ClosedStorage)?;
        let current = file.metadata()?.len();

        let (from, to) = (current.min(len), current.max(len));
        let _lock = RangeLock::acquire(file, from, to - from, LockKind::Exclusive, locking)?;
        file.set_len(len)?;
        Ok(())
    }

    fn file_len(&self) -> Result<u64> {
        let file = self.file.as_ref().ok_or(StoreError::ClosedStorage)?;
        Ok(file.metadata()?.len())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.file.is_none() {
            return Err(StoreError::ClosedStorage);
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and inspection)
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn codec(&self) -> &Arc<PayloadCodec<S>> {
        &self.codec
    }

    /// Descriptor of the record stored under `key`
    pub fn metadata(&self, key: &StorageKey) -> Option<&RecordMetadata> {
        self.index.get(key)
    }

    /// All records in index-slot order
    pub fn records(&self) -> impl Iterator<Item = &RecordMetadata> {
        self.slots.iter().filter_map(|key| self.index.get(key))
    }

    /// All keys in index-slot order
    pub fn keys(&self) -> impl Iterator<Item = &StorageKey> {
        self.slots.iter()
    }

    /// Number of live index slots
    pub fn record_count(&self) -> u32 {
        self.slots.len() as u32
    }

    /// First byte of the data region
    pub fn data_start(&self) -> u64 {
        self.header.data_start
    }

    /// Number of values currently cached
    pub fn cached_values(&self) -> usize {
        self.cache.len()
    }
}

fn payload_size(payload: &[u8]) -> Result<u32> {
    if payload.is_empty() {
        return Err(StoreError::Serialization("empty payload".to_string()));
    }
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(StoreError::PayloadTooLarge { len: payload.len() });
    }
    Ok(payload.len() as u32)
}
