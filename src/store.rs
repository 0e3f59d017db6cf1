//! Store Module
//!
//! The public handle on one storage file.
//!
//! ## Responsibilities
//! - Open the engine and put the write buffer in front of it
//! - Validate keys and route typed reads/writes
//! - Enforce the open/closed lifecycle (every call after close fails)
//! - Flush pending writes before anything that reports on-disk state

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info};

use crate::buffer::{FlushReport, WriteBuffer};
use crate::codec::{BincodeSerializer, PayloadCodec, Serializer};
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::key::StorageKey;
use crate::storage::StorageEngine;

/// An open storage file
///
/// ## Concurrency Model
///
/// All methods take `&self`; a `Store` can be shared across threads (the
/// registry hands out `Arc<Store>`).
///
/// - **Writes** (put/delete): only touch the pending map, then re-arm the
///   idle timer
/// - **Reads** (get/contains): pending map first, then the engine under its
///   mutex
/// - **Flush**: runs on the writer thread after the idle delay, or inline on
///   save/close/size/file_size
pub struct Store<S: Serializer = BincodeSerializer> {
    /// Backing file path, as given in the config
    path: PathBuf,

    /// Pending writes plus the engine behind them
    buffer: WriteBuffer<S>,

    /// Cleared by `close`
    open: AtomicBool,
}

impl Store<BincodeSerializer> {
    /// Open or create the file at `config.path` with bincode payloads
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with_serializer(config, BincodeSerializer)
    }

    /// Open with default settings at `path`
    pub fn open_path(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(Config::builder().path(path).build())
    }
}

impl<S: Serializer> Store<S> {
    /// Open or create the file at `config.path` using `serializer` for values
    ///
    /// Steps:
    /// 1. Open the engine (creates or scans the file)
    /// 2. Wrap it in a write buffer (no timer when read-only)
    pub fn open_with_serializer(config: Config, serializer: S) -> Result<Self> {
        // Step 1: Engine
        let codec = Arc::new(PayloadCodec::new(serializer, config.compression));
        let engine = StorageEngine::open(&config, codec)?;

        // Step 2: Write buffer
        let buffer = WriteBuffer::new(engine, config.read_only, config.save_delay_ms)?;

        info!(
            path = %config.path.display(),
            read_only = config.read_only,
            save_delay_ms = config.save_delay_ms,
            "store opened"
        );

        Ok(Self {
            path: config.path,
            buffer,
            open: AtomicBool::new(true),
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Value stored under `key`, if any
    ///
    /// Fails with `TypeMismatch` when the stored value does not decode as `T`.
    pub fn get<T>(&self, key: impl AsRef<[u8]>) -> Result<Option<T>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.ensure_open()?;
        let key = StorageKey::new(key)?;

        let value = self.logged("get", &key, self.buffer.get::<T>(&key))?;
        Ok(value.map(|value| (*value).clone()))
    }

    /// Value stored under `key`, or `default` after storing it
    ///
    /// The default is written through (put plus save) and only returned once it
    /// is on disk. On a read-only store it is returned without being stored.
    pub fn get_or_put<T>(&self, key: impl AsRef<[u8]>, default: T) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let key = key.as_ref();
        if let Some(value) = self.get::<T>(key)? {
            return Ok(value);
        }
        if self.buffer.is_read_only() {
            return Ok(default);
        }

        self.put(key, default.clone())?;
        self.save()?;
        Ok(default)
    }

    /// Encoded payload stored under `key` (pending writes are flushed first)
    pub fn get_raw(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        let key = StorageKey::new(key)?;
        self.save()?;
        let result = self.buffer.engine().get_raw(&key);
        self.logged("get_raw", &key, result)
    }

    /// Whether `key` has a value (pending writes included)
    pub fn contains(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        self.ensure_open()?;
        let key = StorageKey::new(key)?;
        Ok(self.buffer.contains(&key))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store `value` under `key`
    ///
    /// Buffered: it reaches disk once writes go idle for the save delay, or on
    /// `save`/`close`. Reads see it immediately.
    pub fn put<T>(&self, key: impl AsRef<[u8]>, value: T) -> Result<()>
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.ensure_open()?;
        let key = StorageKey::new(key)?;
        self.buffer.put(key, value)
    }

    /// Remove `key`; returns whether it had a value
    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        self.ensure_open()?;
        let key = StorageKey::new(key)?;
        self.buffer.delete(key)
    }

    /// Write every pending change to disk now
    ///
    /// Fails with `WriteFailed` if any pending change could not be applied;
    /// those changes are dropped.
    pub fn save(&self) -> Result<FlushReport> {
        self.ensure_open()?;
        self.buffer.flush().into_result()
    }

    // =========================================================================
    // File State
    // =========================================================================

    /// Number of records (pending writes are flushed first)
    pub fn size(&self) -> Result<usize> {
        self.save()?;
        Ok(self.buffer.engine().size())
    }

    /// Length of the backing file (pending writes are flushed first)
    pub fn file_size(&self) -> Result<u64> {
        self.save()?;
        let result = self.buffer.engine().file_size();
        self.logged_io("file_size", result)
    }

    /// User-defined version number in the file header
    pub fn version(&self) -> Result<i32> {
        self.ensure_open()?;
        Ok(self.buffer.engine().version())
    }

    pub fn set_version(&self, version: i32) -> Result<()> {
        self.ensure_open()?;
        let result = self.buffer.engine().set_version(version);
        self.logged_io("set_version", result)
    }

    pub fn has_pending_writes(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.buffer.has_pending_writes())
    }

    pub fn save_delay(&self) -> Duration {
        self.buffer.save_delay()
    }

    /// Change the idle delay before pending writes are flushed
    pub fn set_save_delay(&self, delay: Duration) -> Result<()> {
        self.ensure_open()?;
        self.buffer.set_save_delay(delay);
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Flush, persist the header and release the file
    ///
    /// Fails with `ClosedStorage` if already closed.
    pub fn close(&self) -> Result<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Err(StoreError::ClosedStorage);
        }

        let report = self.buffer.close();
        let report = self.logged_io("close", report)?;
        info!(path = %self.path.display(), flushed = report.written + report.deleted, "store closed");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn is_read_only(&self) -> bool {
        self.buffer.is_read_only()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the engine (pending writes are flushed first)
    pub fn with_engine<R>(&self, f: impl FnOnce(&StorageEngine<S>) -> R) -> Result<R> {
        self.save()?;
        let engine = self.buffer.engine();
        Ok(f(&engine))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn ensure_open(&self) -> Result<()> {
        if !self.is_open() {
            return Err(StoreError::ClosedStorage);
        }
        Ok(())
    }

    fn logged<T>(&self, op: &str, key: &StorageKey, result: Result<T>) -> Result<T> {
        if let Err(StoreError::Io(e)) = &result {
            error!(path = %self.path.display(), op, key = %key, error = %e, "storage I/O failed");
        }
        result
    }

    fn logged_io<T>(&self, op: &str, result: Result<T>) -> Result<T> {
        if let Err(StoreError::Io(e)) = &result {
            error!(path = %self.path.display(), op, error = %e, "storage I/O failed");
        }
        result
    }
}

impl<S: Serializer> Drop for Store<S> {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(e) = self.close() {
                error!(path = %self.path.display(), error = %e, "failed to close store on drop");
            }
        }
    }
}
