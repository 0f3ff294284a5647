//! Codec Module
//!
//! Serializes values to JSON bytes and compresses them with LZ4 when they exceed
//! the category's compression threshold. The compressed form is kept only when it
//! is actually smaller than the raw form.
//!
//! Values crossing the shared tier are additionally framed as
//! `[flag: u8][original_size: u64 BE][payload]` since that tier stores opaque bytes.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CacheError, Result};

const FLAG_RAW: u8 = 0;
const FLAG_LZ4: u8 = 1;
const FRAME_HEADER_LEN: usize = 1 + 8;

// == Encoded Value ==
/// A serialized, possibly compressed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedValue {
    /// Stored bytes (compressed when `is_compressed`)
    pub payload: Bytes,
    /// Whether `payload` is LZ4-compressed
    pub is_compressed: bool,
    /// Serialized length before compression
    pub original_size: usize,
}

impl EncodedValue {
    // == Frame ==
    /// Wraps the payload in the shared-tier frame.
    pub fn to_frame(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + self.payload.len());
        buf.put_u8(if self.is_compressed { FLAG_LZ4 } else { FLAG_RAW });
        buf.put_u64(self.original_size as u64);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parses a shared-tier frame.
    pub fn from_frame(frame: Bytes) -> Result<Self> {
        if frame.len() < FRAME_HEADER_LEN {
            return Err(CacheError::Codec(format!(
                "frame too short: {} bytes",
                frame.len()
            )));
        }

        let is_compressed = match frame[0] {
            FLAG_RAW => false,
            FLAG_LZ4 => true,
            other => {
                return Err(CacheError::Codec(format!("unknown frame flag {:#04x}", other)));
            }
        };

        let mut size = [0u8; 8];
        size.copy_from_slice(&frame[1..FRAME_HEADER_LEN]);
        let original_size = usize::try_from(u64::from_be_bytes(size))
            .map_err(|_| CacheError::Codec("original size overflows usize".to_string()))?;

        let payload = frame.slice(FRAME_HEADER_LEN..);
        if !is_compressed && payload.len() != original_size {
            return Err(CacheError::Codec(format!(
                "raw payload is {} bytes, header says {}",
                payload.len(),
                original_size
            )));
        }

        Ok(Self {
            payload,
            is_compressed,
            original_size,
        })
    }

    /// Decodes this value into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        decode(&self.payload, self.is_compressed, self.original_size)
    }
}

// == Encode ==
/// Serializes `value` and compresses it when the serialized form is larger
/// than `threshold` bytes and compression actually shrinks it.
pub fn encode<T: Serialize + ?Sized>(value: &T, threshold: usize) -> Result<EncodedValue> {
    let raw = serde_json::to_vec(value)?;
    let original_size = raw.len();

    if original_size > threshold && original_size <= i32::MAX as usize {
        match lz4::block::compress(&raw, None, false) {
            Ok(compressed) if compressed.len() < original_size => {
                return Ok(EncodedValue {
                    payload: Bytes::from(compressed),
                    is_compressed: true,
                    original_size,
                });
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("LZ4 compression failed, storing raw: {}", e);
            }
        }
    }

    Ok(EncodedValue {
        payload: Bytes::from(raw),
        is_compressed: false,
        original_size,
    })
}

// == Decode ==
/// Reverses [`encode`]: decompresses if needed and deserializes.
pub fn decode<T: DeserializeOwned>(
    payload: &[u8],
    is_compressed: bool,
    original_size: usize,
) -> Result<T> {
    if !is_compressed {
        return Ok(serde_json::from_slice(payload)?);
    }

    // LZ4 cannot expand input by more than 255x, so a larger claim is corrupt
    let max_size = payload.len().saturating_mul(255).saturating_add(16);
    if original_size > max_size {
        return Err(CacheError::Codec(format!(
            "original size {} exceeds the {} bytes a {} byte payload can hold",
            original_size,
            max_size,
            payload.len()
        )));
    }

    let size = i32::try_from(original_size)
        .map_err(|_| CacheError::Codec(format!("invalid original size {}", original_size)))?;
    let raw = lz4::block::decompress(payload, Some(size))
        .map_err(|e| CacheError::Codec(format!("LZ4 decompression failed: {}", e)))?;
    Ok(serde_json::from_slice(&raw)?)
}
