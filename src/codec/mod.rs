//! Codec Module
//!
//! Turns values into record payloads and back.
//!
//! ## Responsibilities
//! - Pluggable value serialization (`Serializer`, injected at open time)
//! - Optional deflate compression of the serialized body
//! - Report a body that does not decode as the requested type as `TypeMismatch`
//!
//! ## Payload Format
//! ```text
//! ┌──────────┬──────────────────────┐
//! │Flags (1) │ Body (serializer out)│
//! └──────────┴──────────────────────┘
//! ```
//! Flags bit 0 marks a deflated body. Other bits are reserved and rejected.

mod payload;

pub use payload::{is_deflated, PayloadCodec, FLAG_DEFLATE, PAYLOAD_PREFIX_SIZE};

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Value serialization capability
///
/// Implementations must be deterministic: the same value always encodes to
/// the same bytes.
pub trait Serializer: Send + Sync + 'static {
    /// Serialize a value to bytes
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize a value from bytes
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// Compact binary serialization (default)
///
/// Fixed-width integers, little endian. Decoding rejects trailing bytes, so a
/// body written for a longer type does not read as a shorter one.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

impl Serializer for BincodeSerializer {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(bincode_options().serialize(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        Ok(bincode_options().deserialize(bytes)?)
    }
}

/// Human-readable JSON serialization
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
