//! Pending map
//!
//! Coalescing map of writes not yet applied to the engine.

use std::collections::HashMap;

use crate::key::StorageKey;

use super::PendingEntry;

/// Last pending write per key, ordered by when that write happened
#[derive(Debug, Default)]
pub struct PendingMap {
    entries: HashMap<StorageKey, (u64, PendingEntry)>,
    next_seq: u64,
}

impl PendingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write, superseding any earlier pending write for `key`
    pub fn insert(&mut self, key: StorageKey, entry: PendingEntry) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(key, (seq, entry));
    }

    pub fn get(&self, key: &StorageKey) -> Option<&PendingEntry> {
        self.entries.get(key).map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Swap out every pending write, oldest last-write first
    pub fn take(&mut self) -> Vec<(StorageKey, PendingEntry)> {
        let mut batch: Vec<_> = std::mem::take(&mut self.entries)
            .into_iter()
            .map(|(key, (seq, entry))| (seq, key, entry))
            .collect();
        batch.sort_unstable_by_key(|(seq, _, _)| *seq);

        batch.into_iter().map(|(_, key, entry)| (key, entry)).collect()
    }
}
