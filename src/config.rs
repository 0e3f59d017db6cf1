//! Configuration for slotstore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, StoreError};

/// Main configuration for a storage file
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // File Configuration
    // -------------------------------------------------------------------------
    /// Path of the single backing file (created on first open)
    pub path: PathBuf,

    /// Open without a write buffer; puts and deletes are rejected
    pub read_only: bool,

    /// Take advisory byte-range locks around every header, index and data access
    pub file_locking: bool,

    // -------------------------------------------------------------------------
    // Write Buffer Configuration
    // -------------------------------------------------------------------------
    /// Idle time after the last write before the pending batch is flushed
    /// (milliseconds). Zero writes through on every put.
    pub save_delay_ms: u64,

    // -------------------------------------------------------------------------
    // Engine Configuration
    // -------------------------------------------------------------------------
    /// Max number of deserialized values kept in the read cache (0 disables it)
    pub cache_capacity: usize,

    /// Extra index slots reserved on growth, as a fraction of the current count
    pub growth_weight: f32,

    /// Payload compression applied on top of the serializer
    pub compression: Compression,
}

/// Payload compression mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Store serializer output as-is
    None,

    /// Raw deflate at the given level (0-9)
    Deflate { level: u32 },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./slotstore.db"),
            read_only: false,
            file_locking: false,
            save_delay_ms: 3000,
            cache_capacity: 256,
            growth_weight: 0.5,
            compression: Compression::None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if !self.growth_weight.is_finite() || self.growth_weight < 0.0 {
            return Err(StoreError::Config(format!(
                "growth_weight must be a finite, non-negative number (got {})",
                self.growth_weight
            )));
        }
        if let Compression::Deflate { level } = self.compression {
            if level > 9 {
                return Err(StoreError::Config(format!(
                    "deflate level must be 0-9 (got {})",
                    level
                )));
            }
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the backing file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Open the file read-only (no write buffer)
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.read_only = read_only;
        self
    }

    /// Enable advisory byte-range locking
    pub fn file_locking(mut self, enabled: bool) -> Self {
        self.config.file_locking = enabled;
        self
    }

    /// Set the idle delay before pending writes are flushed (in milliseconds)
    pub fn save_delay_ms(mut self, ms: u64) -> Self {
        self.config.save_delay_ms = ms;
        self
    }

    /// Set the read cache capacity (number of values)
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    /// Set the index growth weight
    pub fn growth_weight(mut self, weight: f32) -> Self {
        self.config.growth_weight = weight;
        self
    }

    /// Set the payload compression mode
    pub fn compression(mut self, compression: Compression) -> Self {
        self.config.compression = compression;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
