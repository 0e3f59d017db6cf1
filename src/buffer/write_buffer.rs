//! Write buffer
//!
//! Pending writes in front of the storage engine, flushed after an idle delay.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

use crate::codec::{BincodeSerializer, PayloadCodec, Serializer};
use crate::error::{Result, StoreError};
use crate::key::StorageKey;
use crate::storage::{CachedValue, StorageEngine};

use super::{DelayTimer, FlushReport, PendingEntry, PendingMap};

/// Name of the thread that runs delayed flushes
const WRITER_THREAD_NAME: &str = "slotstore-writer";

/// State shared between callers and the timer thread
struct Shared<S> {
    /// The engine; every disk access goes through this lock
    engine: Mutex<StorageEngine<S>>,

    /// Writes not yet applied to the engine
    pending: Mutex<PendingMap>,
}

impl<S: Serializer> Shared<S> {
    /// Apply every pending write to the engine
    ///
    /// The engine lock is taken before the pending map is swapped out, so a
    /// reader that misses the pending map always waits for the batch to land.
    fn flush(&self) -> FlushReport {
        let mut engine = self.engine.lock();
        let batch = self.pending.lock().take();

        let mut report = FlushReport::default();
        if batch.is_empty() {
            return report;
        }

        for (key, entry) in batch {
            let result = match entry {
                PendingEntry::Value { payload, value, .. } => engine
                    .put_payload(&key, &payload, Some(value))
                    .map(|()| report.written += 1),
                PendingEntry::Tombstone => engine.delete(&key).map(|existed| {
                    if existed {
                        report.deleted += 1;
                    }
                }),
            };

            if let Err(e) = result {
                report.failed += 1;
                error!(path = %engine.path().display(), key = %key, error = %e, "failed to apply pending write");
            }
        }

        debug!(
            path = %engine.path().display(),
            written = report.written,
            deleted = report.deleted,
            failed = report.failed,
            "flushed pending writes"
        );
        report
    }
}

/// Coalescing write buffer over a `StorageEngine`
///
/// ## Write Path
/// 1. Encode the value (errors surface to the caller right away)
/// 2. Replace the key's pending entry
/// 3. Re-arm the idle timer; with a zero delay, flush inline instead
///
/// ## Read Path
/// 1. Pending map (a tombstone reads as absent)
/// 2. Engine (cache, then disk)
///
/// Opened read-only, the buffer has no timer and rejects writes.
pub struct WriteBuffer<S: Serializer = BincodeSerializer> {
    shared: Arc<Shared<S>>,

    /// Shared with the engine
    codec: Arc<PayloadCodec<S>>,

    /// Idle-flush timer; `None` when read-only
    timer: Option<DelayTimer>,

    /// Current save delay in milliseconds
    save_delay_ms: AtomicU64,

    /// Set once `close` has run
    closed: AtomicBool,
}

impl<S: Serializer> WriteBuffer<S> {
    /// Wrap `engine`, starting the flush timer unless `read_only`
    pub fn new(engine: StorageEngine<S>, read_only: bool, save_delay_ms: u64) -> Result<Self> {
        let codec = engine.codec().clone();
        let shared = Arc::new(Shared {
            engine: Mutex::new(engine),
            pending: Mutex::new(PendingMap::new()),
        });

        let timer = if read_only {
            None
        } else {
            let weak = Arc::downgrade(&shared);
            Some(DelayTimer::spawn(WRITER_THREAD_NAME, move || {
                if let Some(shared) = weak.upgrade() {
                    shared.flush();
                }
            })?)
        };

        Ok(Self {
            shared,
            codec,
            timer,
            save_delay_ms: AtomicU64::new(save_delay_ms),
            closed: AtomicBool::new(false),
        })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Buffer `value` under `key`, superseding any pending write for it
    pub fn put<T>(&self, key: StorageKey, value: T) -> Result<()>
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.ensure_writable()?;

        let payload = self.codec.encode(&value)?;
        let value: CachedValue = Arc::new(value);
        let entry = PendingEntry::Value { payload, value };
        self.shared.pending.lock().insert(key, entry);

        self.schedule_flush();
        Ok(())
    }

    /// Buffer a delete of `key`
    ///
    /// Returns whether the key was present (pending or on disk) beforehand.
    pub fn delete(&self, key: StorageKey) -> Result<bool> {
        self.ensure_writable()?;

        let existed = self.contains(&key);
        self.shared.pending.lock().insert(key, PendingEntry::Tombstone);

        self.schedule_flush();
        Ok(existed)
    }

    fn schedule_flush(&self) {
        let delay = self.save_delay_ms.load(Ordering::Relaxed);
        if delay == 0 {
            self.shared.flush();
        } else if let Some(timer) = &self.timer {
            timer.schedule(Duration::from_millis(delay));
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Latest value for `key`, pending writes first
    ///
    /// A pending value put as another Rust type (`&str` read as `String`) is
    /// decoded from its payload.
    pub fn get<T>(&self, key: &StorageKey) -> Result<Option<Arc<T>>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        {
            let pending = self.shared.pending.lock();
            match pending.get(key) {
                Some(PendingEntry::Value { payload, value }) => {
                    return match value.clone().downcast::<T>() {
                        Ok(value) => Ok(Some(value)),
                        Err(_) => self.codec.decode::<T>(payload).map(|v| Some(Arc::new(v))),
                    };
                }
                Some(PendingEntry::Tombstone) => return Ok(None),
                None => {}
            }
        }

        self.shared.engine.lock().get(key)
    }

    /// Whether `key` currently has a value, pending or on disk
    pub fn contains(&self, key: &StorageKey) -> bool {
        if let Some(entry) = self.shared.pending.lock().get(key) {
            return !entry.is_tombstone();
        }
        self.shared.engine.lock().contains(key)
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.shared.pending.lock().is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.shared.pending.lock().len()
    }

    // =========================================================================
    // Flush / Lifecycle
    // =========================================================================

    /// Apply pending writes now, disarming the idle timer
    pub fn flush(&self) -> FlushReport {
        if let Some(timer) = &self.timer {
            timer.cancel();
        }
        self.shared.flush()
    }

    /// Stop the timer, flush, then close the engine
    ///
    /// The engine is closed even when some pending writes fail; the failure is
    /// then reported as `WriteFailed`.
    pub fn close(&self) -> Result<FlushReport> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::ClosedStorage);
        }
        if let Some(timer) = &self.timer {
            timer.shutdown();
        }
        let report = self.shared.flush();
        self.shared.engine.lock().close()?;
        report.into_result()
    }

    pub fn save_delay(&self) -> Duration {
        Duration::from_millis(self.save_delay_ms.load(Ordering::Relaxed))
    }

    /// Change the idle delay; applies from the next write on
    pub fn set_save_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.save_delay_ms.store(ms, Ordering::Relaxed);
    }

    /// Lock the engine for direct access
    ///
    /// Pending writes are not applied; call `flush` first when they matter.
    pub fn engine(&self) -> MutexGuard<'_, StorageEngine<S>> {
        self.shared.engine.lock()
    }

    pub fn codec(&self) -> &Arc<PayloadCodec<S>> {
        &self.codec
    }

    pub fn is_read_only(&self) -> bool {
        self.timer.is_none()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StoreError::ClosedStorage);
        }
        if self.timer.is_none() {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }
}
