//! Payload codec
//!
//! Wraps a `Serializer` with the flags byte and optional compression.

use std::any::type_name;
use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Compression;
use crate::error::{Result, StoreError};

use super::Serializer;

/// Flags (1)
pub const PAYLOAD_PREFIX_SIZE: usize = 1;

/// Body is raw-deflate compressed
pub const FLAG_DEFLATE: u8 = 0x01;

/// Every flag bit this version understands
const KNOWN_FLAGS: u8 = FLAG_DEFLATE;

/// Encodes values into record payloads
#[derive(Debug, Clone)]
pub struct PayloadCodec<S> {
    serializer: S,
    compression: Compression,
}

impl<S: Serializer> PayloadCodec<S> {
    pub fn new(serializer: S, compression: Compression) -> Self {
        Self {
            serializer,
            compression,
        }
    }

    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Encode `value` as a payload
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let body = self.serializer.encode(value)?;

        let (flags, body) = match self.compression {
            Compression::None => (0u8, body),
            Compression::Deflate { level } => {
                let mut encoder = DeflateEncoder::new(
                    Vec::with_capacity(body.len() / 2),
                    flate2::Compression::new(level),
                );
                encoder.write_all(&body)?;
                (FLAG_DEFLATE, encoder.finish()?)
            }
        };

        let mut payload = Vec::with_capacity(PAYLOAD_PREFIX_SIZE + body.len());
        payload.push(flags);
        payload.extend_from_slice(&body);
        Ok(payload)
    }

    /// Decode a payload as `T`
    ///
    /// The serializer decides compatibility: a body it cannot read as `T`
    /// fails with `TypeMismatch`.
    pub fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T> {
        let (flags, body) = split(payload)?;

        let decoded = if flags & FLAG_DEFLATE != 0 {
            let mut inflated = Vec::with_capacity(body.len() * 2);
            DeflateDecoder::new(body).read_to_end(&mut inflated)?;
            self.serializer.decode(&inflated)
        } else {
            self.serializer.decode(body)
        };

        decoded.map_err(|e| StoreError::TypeMismatch {
            expected: type_name::<T>().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Whether a stored payload has a deflated body
pub fn is_deflated(payload: &[u8]) -> Result<bool> {
    split(payload).map(|(flags, _)| flags & FLAG_DEFLATE != 0)
}

/// Split a payload into (flags, body)
fn split(payload: &[u8]) -> Result<(u8, &[u8])> {
    let Some((&flags, body)) = payload.split_first() else {
        return Err(StoreError::Serialization("empty payload".to_string()));
    };

    if flags & !KNOWN_FLAGS != 0 {
        return Err(StoreError::Serialization(format!(
            "unknown payload flags: {:#04x}",
            flags
        )));
    }

    Ok((flags, body))
}
