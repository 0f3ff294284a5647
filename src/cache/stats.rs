//! Cache Statistics Module
//!
//! Tracks cache performance metrics: per-tier hits, misses, evictions and
//! shared-tier failures.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;

// == Counters ==
#[derive(Debug, Default)]
struct Counters {
    total_requests: AtomicU64,
    local_hits: AtomicU64,
    shared_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    shared_errors: AtomicU64,
    bytes_written: AtomicU64,
    compressed_writes: AtomicU64,
}

// == Cache Stats ==
/// Process-wide counters for one engine instance.
///
/// Increments hold the read lock, so they run concurrently with each other;
/// `reset` and `snapshot` take the write lock and therefore never observe a
/// half-applied reset.
#[derive(Debug, Default)]
pub struct CacheStats {
    counters: RwLock<Counters>,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self, pick: impl FnOnce(&Counters) -> &AtomicU64, by: u64) {
        let counters = self.counters.read();
        pick(&counters).fetch_add(by, Ordering::Relaxed);
    }

    // == Record Lookups ==
    /// Records a lookup served by the local tier.
    pub fn record_local_hit(&self) {
        let counters = self.counters.read();
        counters.total_requests.fetch_add(1, Ordering::Relaxed);
        counters.local_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a lookup served by the shared tier.
    pub fn record_shared_hit(&self) {
        let counters = self.counters.read();
        counters.total_requests.fetch_add(1, Ordering::Relaxed);
        counters.shared_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a lookup that neither tier could serve.
    pub fn record_miss(&self) {
        let counters = self.counters.read();
        counters.total_requests.fetch_add(1, Ordering::Relaxed);
        counters.misses.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Eviction ==
    /// Adds evicted entries to the eviction counter.
    pub fn record_evictions(&self, count: usize) {
        if count > 0 {
            self.bump(|c| &c.evictions, count as u64);
        }
    }

    /// Records a failed or timed-out shared tier call.
    pub fn record_shared_error(&self) {
        self.bump(|c| &c.shared_errors, 1);
    }

    /// Records a write of `original_size` bytes.
    pub fn record_write(&self, original_size: usize, compressed: bool) {
        let counters = self.counters.read();
        counters
            .bytes_written
            .fetch_add(original_size as u64, Ordering::Relaxed);
        if compressed {
            counters.compressed_writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    // == Reset ==
    /// Zeroes every counter atomically with respect to concurrent increments.
    pub fn reset(&self) {
        let mut counters = self.counters.write();
        *counters = Counters::default();
    }

    // == Snapshot ==
    /// Returns a consistent copy of all counters.
    pub fn snapshot(&self) -> CounterSnapshot {
        let counters = self.counters.write();
        CounterSnapshot {
            total_requests: counters.total_requests.load(Ordering::Relaxed),
            local_hits: counters.local_hits.load(Ordering::Relaxed),
            shared_hits: counters.shared_hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
            shared_errors: counters.shared_errors.load(Ordering::Relaxed),
            bytes_written: counters.bytes_written.load(Ordering::Relaxed),
            compressed_writes: counters.compressed_writes.load(Ordering::Relaxed),
        }
    }
}

// == Counter Snapshot ==
/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// Lookups of any outcome
    pub total_requests: u64,
    /// Lookups served by the local tier
    pub local_hits: u64,
    /// Lookups served by the shared tier
    pub shared_hits: u64,
    /// Lookups served by neither tier
    pub misses: u64,
    /// Entries evicted from the local tier
    pub evictions: u64,
    /// Shared tier failures and timeouts
    pub shared_errors: u64,
    /// Cumulative pre-compression bytes written
    pub bytes_written: u64,
    /// Writes that stored a compressed payload
    pub compressed_writes: u64,
}

impl CounterSnapshot {
    /// Total hits across both tiers.
    pub fn hits(&self) -> u64 {
        self.local_hits + self.shared_hits
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / total requests, or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.hits() as f64 / self.total_requests as f64
        }
    }
}

// == Stats Snapshot ==
/// Report returned by `TieredCache::stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Lookups of any outcome
    pub total_requests: u64,
    /// Hits across both tiers
    pub hits: u64,
    /// Lookups served by the local tier
    pub local_hits: u64,
    /// Lookups served by the shared tier
    pub shared_hits: u64,
    /// Lookups served by neither tier
    pub misses: u64,
    /// hits / total_requests
    pub hit_rate: f64,
    /// Entries currently held locally
    pub local_entries: usize,
    /// Entries currently held by the shared tier, if it can count them
    pub shared_entries: Option<usize>,
    /// Payload bytes currently held locally
    pub local_bytes: u64,
    /// Entries evicted from the local tier
    pub evictions: u64,
    /// Shared tier failures and timeouts
    pub shared_errors: u64,
    /// Whether the last shared tier call succeeded
    pub shared_available: bool,
    /// Cumulative pre-compression bytes written
    pub bytes_written: u64,
    /// Writes that stored a compressed payload
    pub compressed_writes: u64,
}

impl StatsSnapshot {
    /// Combines counters with current tier sizes.
    pub fn new(
        counters: CounterSnapshot,
        local_entries: usize,
        local_bytes: u64,
        shared_entries: Option<usize>,
        shared_available: bool,
    ) -> Self {
        Self {
            total_requests: counters.total_requests,
            hits: counters.hits(),
            local_hits: counters.local_hits,
            shared_hits: counters.shared_hits,
            misses: counters.misses,
            hit_rate: counters.hit_rate(),
            local_entries,
            shared_entries,
            local_bytes,
            evictions: counters.evictions,
            shared_errors: counters.shared_errors,
            shared_available,
            bytes_written: counters.bytes_written,
            compressed_writes: counters.compressed_writes,
        }
    }
}
