//! Tiered Cache Engine
//!
//! Coordinates the local [`EntryStore`] and a [`SharedTier`] backend:
//! local lookups first, shared lookups with a bounded timeout, promotion of
//! shared hits into the local tier, and write-through on `set`.
//!
//! Shared tier failures never fail a request. They are logged, counted in the
//! stats and otherwise treated as a miss (reads) or ignored (writes).
//!
//! Promotion never overwrites: a value read from the shared tier is only
//! written locally if the key is still vacant and no delete, invalidate or
//! clear ran while the read was in flight.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::cache::codec::{self, EncodedValue};
use crate::cache::pattern::KeyPattern;
use crate::cache::policy::PolicyRegistry;
use crate::cache::shared::SharedTier;
use crate::cache::stats::{CacheStats, StatsSnapshot};
use crate::cache::store::EntryStore;
use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

// == Cache Options ==
/// Engine-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Capacity of the local tier
    pub max_local_entries: usize,
    /// Upper bound on any single shared tier call
    pub shared_timeout: Duration,
    /// Upper bound on a whole bulk removal (pattern invalidation, clear)
    pub bulk_timeout: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_local_entries: 10_000,
            shared_timeout: Duration::from_millis(250),
            bulk_timeout: Duration::from_secs(30),
        }
    }
}

// == Health Report ==
/// Shared tier reachability, as reported by [`TieredCache::health`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    /// Backend name
    pub shared_tier: &'static str,
    /// Whether a ping succeeded within the timeout
    pub shared_available: bool,
    /// Entries held locally
    pub local_entries: usize,
}

/// Builds the fully-qualified `<category>:<key>` form.
pub fn qualified_key(category: &str, key: &str) -> String {
    format!("{}:{}", category, key)
}

/// Which time budget a shared tier call runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Budget {
    /// One round trip; overrunning it means the tier is unhealthy
    Call,
    /// A multi round trip sweep; overrunning it only means the sweep is large
    Bulk,
}

// == Tiered Cache ==
/// Two-tier cache engine. Cheap to share behind an `Arc`; holds no
/// engine-wide lock.
pub struct TieredCache {
    local: EntryStore,
    shared: Arc<dyn SharedTier>,
    policies: PolicyRegistry,
    stats: CacheStats,
    options: CacheOptions,
    shared_available: AtomicBool,
    /// Bumped before every delete, invalidate and clear
    removal_epoch: AtomicU64,
}

impl TieredCache {
    // == Constructor ==
    /// Creates an engine over the given shared tier.
    pub fn new(options: CacheOptions, policies: PolicyRegistry, shared: Arc<dyn SharedTier>) -> Self {
        Self {
            local: EntryStore::new(options.max_local_entries),
            shared,
            policies,
            stats: CacheStats::new(),
            options,
            shared_available: AtomicBool::new(true),
            removal_epoch: AtomicU64::new(0),
        }
    }

    /// Runs a single shared tier call under `shared_timeout`.
    ///
    /// Returns `None` on error or timeout, after logging and counting it.
    async fn shared_call<T, F>(&self, op: &str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.run_shared(op, Budget::Call, call).await
    }

    /// Runs a bulk shared tier sweep under `bulk_timeout`.
    ///
    /// Backends bound each of their own round trips; running past the overall
    /// budget is logged but does not mark the tier unavailable.
    async fn bulk_call<T, F>(&self, op: &str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.run_shared(op, Budget::Bulk, call).await
    }

    async fn run_shared<T, F>(&self, op: &str, budget: Budget, call: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        let limit = match budget {
            Budget::Call => self.options.shared_timeout,
            Budget::Bulk => self.options.bulk_timeout,
        };

        match tokio::time::timeout(limit, call).await {
            Ok(Ok(value)) => {
                self.shared_available.store(true, Ordering::Relaxed);
                Some(value)
            }
            Ok(Err(e)) => {
                warn!("Shared tier ({}) {} failed: {}", self.shared.name(), op, e);
                self.mark_shared_failure();
                None
            }
            Err(_) if budget == Budget::Bulk => {
                warn!(
                    "Shared tier ({}) {} did not finish within {:?}, shared removals unreported",
                    self.shared.name(),
                    op,
                    limit
                );
                None
            }
            Err(_) => {
                warn!(
                    "Shared tier ({}) {} timed out after {:?}",
                    self.shared.name(),
                    op,
                    limit
                );
                self.mark_shared_failure();
                None
            }
        }
    }

    fn mark_shared_failure(&self) {
        self.shared_available.store(false, Ordering::Relaxed);
        self.stats.record_shared_error();
    }

    fn current_epoch(&self) -> u64 {
        self.removal_epoch.load(Ordering::SeqCst)
    }

    fn bump_epoch(&self) {
        self.removal_epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Writes a value into the local tier with the category's local TTL.
    fn put_local(&self, qualified: String, encoded: EncodedValue, category: &str) {
        let ttl = self.policies.resolve(category).local_ttl;
        let evicted = self.local.put(CacheEntry::new(qualified, encoded, category, ttl));
        self.stats.record_evictions(evicted);
    }

    // == Promote ==
    /// Copies a shared hit into the local tier, unless a local write or a
    /// removal happened after the shared read started at `epoch`.
    ///
    /// Returns true if the entry was promoted.
    fn promote(&self, qualified: &str, encoded: EncodedValue, category: &str, epoch: u64) -> bool {
        if self.current_epoch() != epoch {
            debug!("Skipping promotion of '{}': removed while in flight", qualified);
            return false;
        }

        let ttl = self.policies.resolve(category).local_ttl;
        let entry = CacheEntry::new(qualified, encoded, category, ttl);
        let Some((seq, evicted)) = self.local.insert_if_vacant(entry) else {
            debug!("Skipping promotion of '{}': newer local entry", qualified);
            return false;
        };
        self.stats.record_evictions(evicted);

        // A removal that bumped the epoch after the first check may have run
        // before the insert; undo our own write in that case
        if self.current_epoch() != epoch {
            self.local.remove_version(qualified, seq);
            return false;
        }

        debug!("Promoted '{}' from shared tier", qualified);
        true
    }

    /// Parses a shared frame and decodes it into `T`.
    fn decode_frame<T: DeserializeOwned>(frame: bytes::Bytes) -> Result<(EncodedValue, T)> {
        let encoded = EncodedValue::from_frame(frame)?;
        let value = encoded.decode()?;
        Ok((encoded, value))
    }

    // == Get ==
    /// Looks up `key` in `category`.
    ///
    /// Returns `Ok(None)` when neither tier holds an unexpired value, and
    /// `Err(CacheError::Codec)` only when a stored payload cannot be decoded.
    /// An undecodable shared payload counts as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, category: &str) -> Result<Option<T>> {
        let qualified = qualified_key(category, key);

        if let Some(entry) = self.local.get(&qualified) {
            self.stats.record_local_hit();
            return entry.encoded().decode().map(Some);
        }

        let epoch = self.current_epoch();
        let frame = self
            .shared_call("get", self.shared.get(&qualified))
            .await
            .flatten();

        let Some(frame) = frame else {
            self.stats.record_miss();
            return Ok(None);
        };

        match Self::decode_frame(frame) {
            Ok((encoded, value)) => {
                self.stats.record_shared_hit();
                self.promote(&qualified, encoded, category, epoch);
                Ok(Some(value))
            }
            Err(e) => {
                self.stats.record_miss();
                Err(e)
            }
        }
    }

    // == Multi Get ==
    /// Batch form of [`get`](Self::get).
    ///
    /// Local hits are resolved first; the remaining keys go to the shared tier
    /// in a single round trip. Keys found in neither tier are absent from the
    /// result.
    ///
    /// Every key is processed (counted, and promoted when found) even if some
    /// payload cannot be decoded; the batch then fails with the first codec
    /// error, naming its key.
    pub async fn mget<T, K>(&self, keys: &[K], category: &str) -> Result<HashMap<String, T>>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
    {
        let mut found = HashMap::with_capacity(keys.len());
        let mut pending: Vec<(String, String)> = Vec::new();
        let mut first_error: Option<CacheError> = None;

        let mut note_failure = |key: &str, e: CacheError| {
            warn!("Undecodable payload for '{}': {}", key, e);
            if first_error.is_none() {
                first_error = Some(CacheError::Codec(format!("key '{}': {}", key, e)));
            }
        };

        for key in keys {
            let key = key.as_ref();
            let qualified = qualified_key(category, key);
            match self.local.get(&qualified) {
                Some(entry) => {
                    self.stats.record_local_hit();
                    match entry.encoded().decode() {
                        Ok(value) => {
                            found.insert(key.to_string(), value);
                        }
                        Err(e) => note_failure(key, e),
                    }
                }
                None => pending.push((key.to_string(), qualified)),
            }
        }

        if !pending.is_empty() {
            let epoch = self.current_epoch();
            let qualified: Vec<String> = pending.iter().map(|(_, q)| q.clone()).collect();
            let mut frames = self
                .shared_call("mget", self.shared.mget(&qualified))
                .await
                .unwrap_or_default()
                .into_iter();

            for (key, qualified) in pending {
                let Some(frame) = frames.next().flatten() else {
                    self.stats.record_miss();
                    continue;
                };
                match Self::decode_frame(frame) {
                    Ok((encoded, value)) => {
                        self.stats.record_shared_hit();
                        self.promote(&qualified, encoded, category, epoch);
                        found.insert(key, value);
                    }
                    Err(e) => {
                        self.stats.record_miss();
                        note_failure(&key, e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(found),
        }
    }

    // == Set ==
    /// Stores `value` under `key` in both tiers.
    ///
    /// Unknown categories use the default policy. A shared tier failure is
    /// logged and counted but does not fail the call; only serialization
    /// errors are returned.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, category: &str) -> Result<()> {
        let policy = *self.policies.resolve(category);
        let encoded = codec::encode(value, policy.compression_threshold)?;
        let qualified = qualified_key(category, key);

        self.stats
            .record_write(encoded.original_size, encoded.is_compressed);
        let frame = encoded.to_frame();
        debug!(
            "Set '{}' ({} bytes, compressed: {})",
            qualified, encoded.original_size, encoded.is_compressed
        );
        self.put_local(qualified.clone(), encoded, category);

        self.shared_call("set", self.shared.set(&qualified, frame, policy.shared_ttl))
            .await;
        Ok(())
    }

    // == Warmup ==
    /// Bulk-loads entries into `category`, issuing the shared writes concurrently.
    ///
    /// Returns the number of entries written locally.
    pub async fn warmup<K, V, I>(&self, entries: I, category: &str) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
    {
        let policy = *self.policies.resolve(category);
        let mut frames = Vec::new();

        for (key, value) in entries {
            let encoded = codec::encode(&value, policy.compression_threshold)?;
            let qualified = qualified_key(category, key.as_ref());
            self.stats
                .record_write(encoded.original_size, encoded.is_compressed);
            frames.push((qualified.clone(), encoded.to_frame()));
            self.put_local(qualified, encoded, category);
        }

        let count = frames.len();
        join_all(frames.into_iter().map(|(qualified, frame)| async move {
            self.shared_call("warmup", self.shared.set(&qualified, frame, policy.shared_ttl))
                .await
        }))
        .await;

        info!("Warmed up {} entries in category '{}'", count, category);
        Ok(count)
    }

    // == Delete ==
    /// Removes one key from both tiers. Returns true if either tier held it.
    pub async fn delete(&self, key: &str, category: &str) -> bool {
        let qualified = qualified_key(category, key);
        self.bump_epoch();
        let local = self.local.delete(&qualified);
        let shared = self
            .shared_call("delete", self.shared.delete(&qualified))
            .await
            .unwrap_or(false);
        local || shared
    }

    // == Invalidate ==
    /// Removes every key matching `pattern` from both tiers.
    ///
    /// `"*"` clears both tiers outright. Returns the sum of removals from the
    /// local and shared tiers.
    pub async fn invalidate(&self, pattern: &str) -> usize {
        let pattern = KeyPattern::parse(pattern);
        self.bump_epoch();

        let (local, shared) = if pattern.is_all() {
            let local = self.local.clear();
            let shared = self.bulk_call("clear", self.shared.clear()).await;
            (local, shared)
        } else {
            let local = self.local.delete_matching(&pattern);
            let shared = self
                .bulk_call("invalidate", self.shared.delete_matching(&pattern))
                .await;
            (local, shared)
        };

        let shared = shared.unwrap_or(0);
        info!(
            "Invalidated {:?}: {} local, {} shared",
            pattern, local, shared
        );
        local + shared
    }

    // == Clear ==
    /// Empties both tiers and resets the stats. Idempotent.
    pub async fn clear(&self) {
        self.bump_epoch();
        let local = self.local.clear();
        let shared = self.bulk_call("clear", self.shared.clear()).await;
        self.stats.reset();
        debug!("Cleared cache: {} local, {:?} shared", local, shared);
    }

    /// Zeroes all counters.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    // == Purge Expired ==
    /// Drops expired entries from the local tier.
    pub fn purge_expired(&self) -> usize {
        self.local.purge_expired()
    }

    // == Stats ==
    /// Returns counters plus current tier sizes.
    ///
    /// The shared count is whatever the backend can report cheaply; backends
    /// that would need a keyspace scan report `None`.
    pub async fn stats(&self) -> StatsSnapshot {
        let shared_entries = self
            .shared_call("count", self.shared.entry_count())
            .await
            .flatten();

        StatsSnapshot::new(
            self.stats.snapshot(),
            self.local.len(),
            self.local.size_bytes(),
            shared_entries,
            self.shared_available.load(Ordering::Relaxed),
        )
    }

    // == Health ==
    /// Pings the shared tier within the timeout.
    pub async fn health(&self) -> HealthReport {
        let shared_available = self.shared_call("ping", self.shared.ping()).await.is_some();
        HealthReport {
            shared_tier: self.shared.name(),
            shared_available,
            local_entries: self.local.len(),
        }
    }

    /// The local tier.
    pub fn local(&self) -> &EntryStore {
        &self.local
    }

    /// The shared tier backend.
    pub fn shared(&self) -> &Arc<dyn SharedTier> {
        &self.shared
    }

    /// The policy registry.
    pub fn policies(&self) -> &PolicyRegistry {
        &self.policies
    }

    /// Engine options.
    pub fn options(&self) -> &CacheOptions {
        &self.options
    }
}
