//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::cache::codec::EncodedValue;

// == Cache Entry ==
/// Represents a single cache entry with payload and metadata.
///
/// Timestamps use `tokio::time::Instant`, which is monotonic and follows the
/// runtime clock when time is paused in tests.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Fully-qualified key (`<category>:<raw key>`)
    pub key: String,
    /// Stored bytes, compressed when `is_compressed`
    pub payload: Bytes,
    /// Whether `payload` is LZ4-compressed
    pub is_compressed: bool,
    /// Serialized size before compression
    pub original_size: usize,
    /// Policy category, fixed at creation
    pub category: String,
    /// Creation time
    pub created_at: Instant,
    /// Last read or write
    pub last_accessed_at: Instant,
    /// Expiration time
    pub expires_at: Instant,
    /// Write sequence number assigned by the owning store
    pub(crate) seq: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry from an encoded value.
    ///
    /// # Arguments
    /// * `key` - Fully-qualified key
    /// * `value` - Encoded payload
    /// * `category` - Policy category
    /// * `ttl` - Lifetime from now
    pub fn new(
        key: impl Into<String>,
        value: EncodedValue,
        category: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            key: key.into(),
            payload: value.payload,
            is_compressed: value.is_compressed,
            original_size: value.original_size,
            category: category.into(),
            created_at: now,
            last_accessed_at: now,
            expires_at: now + ttl,
            seq: 0,
        }
    }

    /// Creates an entry holding opaque bytes (used by the in-process shared tier).
    pub fn opaque(key: impl Into<String>, bytes: Bytes, ttl: Duration) -> Self {
        let size = bytes.len();
        Self::new(
            key,
            EncodedValue {
                payload: bytes,
                is_compressed: false,
                original_size: size,
            },
            "",
            ttl,
        )
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches `expires_at`.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Checks expiry against a given instant.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    // == Time To Live ==
    /// Returns the remaining lifetime, zero once expired.
    pub fn ttl_remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Rebuilds the encoded value for decoding or framing.
    pub fn encoded(&self) -> EncodedValue {
        EncodedValue {
            payload: self.payload.clone(),
            is_compressed: self.is_compressed,
            original_size: self.original_size,
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::codec;

    fn entry(ttl: Duration) -> CacheEntry {
        let value = codec::encode(&"test_value", 1024).unwrap();
        CacheEntry::new("product:1", value, "product", ttl)
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_creation() {
        let entry = entry(Duration::from_secs(60));

        assert_eq!(entry.key, "product:1");
        assert_eq!(entry.category, "product");
        assert!(!entry.is_compressed);
        assert_eq!(entry.original_size, entry.payload.len());
        assert_eq!(entry.created_at, entry.last_accessed_at);
        assert!(!entry.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expiration() {
        let entry = entry(Duration::from_secs(1));
        assert!(!entry.is_expired());

        tokio::time::advance(Duration::from_millis(1100)).await;

        assert!(entry.is_expired());
        assert_eq!(entry.ttl_remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_remaining() {
        let entry = entry(Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(entry.ttl_remaining(), Duration::from_secs(6));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = entry(Duration::ZERO);
        assert!(entry.is_expired_at(entry.expires_at), "Entry should be expired at boundary");
    }

    #[test]
    fn test_opaque_entry() {
        let entry = CacheEntry::opaque("k", Bytes::from_static(b"abc"), Duration::from_secs(5));
        assert_eq!(entry.original_size, 3);
        assert_eq!(entry.encoded().payload, Bytes::from_static(b"abc"));
    }
}
