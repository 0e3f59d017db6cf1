//! Error types for slotstore
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for slotstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to persist {failed} pending write(s)")]
    WriteFailed { failed: usize },

    // -------------------------------------------------------------------------
    // Key / Payload Errors
    // -------------------------------------------------------------------------
    #[error("Invalid key: {len} bytes exceeds the {max}-byte key slot")]
    InvalidKey { len: usize, max: usize },

    #[error("Payload too large: {len} bytes does not fit a record")]
    PayloadTooLarge { len: usize },

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Unable to act on closed storage")]
    ClosedStorage,

    #[error("Storage is opened read-only")]
    ReadOnly,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Type mismatch: stored value does not read as `{expected}`: {reason}")]
    TypeMismatch { expected: String, reason: String },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
