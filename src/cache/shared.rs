//! Shared Tier Module
//!
//! The slower, larger backstop tier behind the local store. Backends only deal
//! in string keys and opaque byte values with a per-key TTL; framing and
//! compression happen in the coordinator.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::cache::pattern::KeyPattern;
use crate::cache::store::EntryStore;
use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

// == Shared Tier Trait ==
/// Storage backend for the shared tier.
#[async_trait]
pub trait SharedTier: Send + Sync {
    /// Short backend name for logs and health reports
    fn name(&self) -> &'static str;

    /// Fetches one value
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Fetches many values in one round trip; the result is index-aligned with `keys`
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>>;

    /// Stores a value that expires after `ttl`
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    /// Removes one key; returns true if it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Removes every key matching the pattern; returns the count removed
    async fn delete_matching(&self, pattern: &KeyPattern) -> Result<usize>;

    /// Removes every key owned by this cache; returns the count removed
    async fn clear(&self) -> Result<usize>;

    /// Number of stored keys, if the backend can count them
    async fn entry_count(&self) -> Result<Option<usize>>;

    /// Connectivity check
    async fn ping(&self) -> Result<()>;
}

// == In-Memory Shared Tier ==
/// Process-local shared tier built on an [`EntryStore`].
///
/// Used when no shared endpoint is configured. Latency and outages can be
/// simulated for fault-injection tests.
#[derive(Debug)]
pub struct InMemorySharedTier {
    store: EntryStore,
    latency_ms: AtomicU64,
    unavailable: AtomicBool,
}

impl InMemorySharedTier {
    /// Creates an in-memory tier holding at most `max_entries` keys.
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: EntryStore::new(max_entries),
            latency_ms: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Builder-style simulated latency applied to every call.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    /// Sets the simulated latency applied to every call.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Makes every call fail with `SharedTierUnavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Direct access to the backing store.
    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    async fn round_trip(&self) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(CacheError::SharedTierUnavailable(
                "in-memory tier marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for InMemorySharedTier {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl SharedTier for InMemorySharedTier {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.round_trip().await?;
        Ok(self.store.get(key).map(|entry| entry.payload))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>> {
        self.round_trip().await?;
        Ok(keys
            .iter()
            .map(|key| self.store.get(key).map(|entry| entry.payload))
            .collect())
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        self.round_trip().await?;
        self.store.put(CacheEntry::opaque(key, value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.round_trip().await?;
        Ok(self.store.delete(key))
    }

    async fn delete_matching(&self, pattern: &KeyPattern) -> Result<usize> {
        self.round_trip().await?;
        Ok(self.store.delete_matching(pattern))
    }

    async fn clear(&self) -> Result<usize> {
        self.round_trip().await?;
        Ok(self.store.clear())
    }

    async fn entry_count(&self) -> Result<Option<usize>> {
        self.round_trip().await?;
        self.store.purge_expired();
        Ok(Some(self.store.len()))
    }

    async fn ping(&self) -> Result<()> {
        self.round_trip().await
    }
}
