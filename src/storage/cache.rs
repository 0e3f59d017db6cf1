//! Value cache
//!
//! Bounded cache of deserialized values keyed by record key. Entries are
//! replaced on every write and dropped on delete, so a hit never returns a
//! value older than the bytes on disk.

use std::any::Any;
use std::sync::Arc;

use quick_cache::unsync::Cache;

use crate::key::StorageKey;

/// A deserialized value, type-erased so one cache serves every value type
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// Count-bounded cache of decoded values
pub struct ValueCache {
    /// `None` when caching is disabled (capacity 0)
    inner: Option<Cache<StorageKey, CachedValue>>,
}

impl ValueCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: (capacity > 0).then(|| Cache::new(capacity)),
        }
    }

    /// Cached value for `key`, if present
    pub fn get(&mut self, key: &StorageKey) -> Option<CachedValue> {
        self.inner.as_ref()?.get(key).cloned()
    }

    /// Store (or replace) the value for `key`
    pub fn insert(&mut self, key: StorageKey, value: CachedValue) {
        if let Some(cache) = self.inner.as_mut() {
            cache.insert(key, value);
        }
    }

    pub fn invalidate(&mut self, key: &StorageKey) {
        if let Some(cache) = self.inner.as_mut() {
            cache.remove(key);
        }
    }

    pub fn clear(&mut self) {
        if let Some(cache) = self.inner.as_mut() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |cache| cache.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
