//! Registry Module
//!
//! Path-keyed table of open stores shared in-process.
//!
//! ## Responsibilities
//! - Hand out one shared `Store` per backing file, counting references
//! - Close and evict a store when its last reference is released
//! - Delete files (closing them first) and shut everything down
//!
//! Holds no storage logic; every store is an ordinary `Store`.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::codec::{BincodeSerializer, Serializer};
use crate::config::Config;
use crate::error::Result;
use crate::store::Store;

/// One open file and how many callers hold it
struct RegistryEntry<S: Serializer> {
    store: Arc<Store<S>>,
    refs: usize,
}

/// Shared handles to open storage files, keyed by normalized path
pub struct StorageRegistry<S: Serializer + Clone = BincodeSerializer> {
    /// Serializer given to every store this registry opens
    serializer: S,

    /// Normalized path → open store
    stores: Mutex<HashMap<PathBuf, RegistryEntry<S>>>,
}

impl StorageRegistry<BincodeSerializer> {
    pub fn new() -> Self {
        Self::with_serializer(BincodeSerializer)
    }
}

impl Default for StorageRegistry<BincodeSerializer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Serializer + Clone> StorageRegistry<S> {
    pub fn with_serializer(serializer: S) -> Self {
        Self {
            serializer,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Open `config.path`, or share the store already open there
    ///
    /// A shared store has its pending writes flushed before it is handed out;
    /// the rest of `config` is ignored in that case.
    pub fn open(&self, mut config: Config) -> Result<Arc<Store<S>>> {
        let path = normalize(&config.path)?;
        let mut stores = self.stores.lock();

        if let Some(entry) = stores.get_mut(&path) {
            if entry.store.is_open() {
                entry.store.save()?;
                entry.refs += 1;
                debug!(path = %path.display(), refs = entry.refs, "shared open store");
                return Ok(entry.store.clone());
            }
        }

        config.path = path.clone();
        let store = Arc::new(Store::open_with_serializer(config, self.serializer.clone())?);
        stores.insert(
            path,
            RegistryEntry {
                store: store.clone(),
                refs: 1,
            },
        );
        Ok(store)
    }

    /// Release one reference to `store`
    ///
    /// Returns `true` when this was the last reference and the store was
    /// closed. Stores this registry does not track are left untouched.
    pub fn close(&self, store: &Arc<Store<S>>) -> Result<bool> {
        let mut stores = self.stores.lock();
        let path = store.path().to_path_buf();

        match stores.get(&path) {
            Some(entry) if Arc::ptr_eq(&entry.store, store) => {}
            _ => return Ok(false),
        }
        release(&mut stores, &path)
    }

    /// Release one reference to the store open at `path`
    pub fn close_path(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = normalize(path.as_ref())?;
        let mut stores = self.stores.lock();
        release(&mut stores, &path)
    }

    /// Close the store at `path` (whatever its reference count), then remove
    /// the file
    pub fn delete(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = normalize(path.as_ref())?;
        let mut stores = self.stores.lock();

        if let Some(entry) = stores.remove(&path) {
            if entry.store.is_open() {
                if let Err(e) = entry.store.close() {
                    error!(path = %path.display(), error = %e, "failed to close store before delete");
                }
            }
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "deleted storage file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Flush and close every open store
    ///
    /// Every store is attempted; the first failure is returned.
    pub fn shutdown_all(&self) -> Result<()> {
        let drained: Vec<_> = self.stores.lock().drain().collect();
        let mut first_error = None;

        for (path, entry) in drained {
            if !entry.store.is_open() {
                continue;
            }
            if let Err(e) = entry.store.close() {
                error!(path = %path.display(), error = %e, "failed to close store on shutdown");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn is_open(&self, path: impl AsRef<Path>) -> bool {
        let Ok(path) = normalize(path.as_ref()) else {
            return false;
        };
        self.stores
            .lock()
            .get(&path)
            .is_some_and(|entry| entry.store.is_open())
    }

    /// References held on the store at `path`
    pub fn ref_count(&self, path: impl AsRef<Path>) -> Option<usize> {
        let path = normalize(path.as_ref()).ok()?;
        self.stores.lock().get(&path).map(|entry| entry.refs)
    }

    /// Number of tracked stores
    pub fn open_count(&self) -> usize {
        self.stores.lock().len()
    }
}

fn release<S: Serializer>(stores: &mut HashMap<PathBuf, RegistryEntry<S>>, path: &Path) -> Result<bool> {
    let Some(entry) = stores.get_mut(path) else {
        return Ok(false);
    };

    entry.refs = entry.refs.saturating_sub(1);
    if entry.refs > 0 {
        debug!(path = %path.display(), refs = entry.refs, "released store reference");
        return Ok(false);
    }

    let Some(entry) = stores.remove(path) else {
        return Ok(false);
    };
    if entry.store.is_open() {
        entry.store.close()?;
    }
    Ok(true)
}

/// Absolute, lexically normalized form of `path` (the file need not exist)
fn normalize(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

