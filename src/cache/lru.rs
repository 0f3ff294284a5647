//! LRU Selection Module
//!
//! Approximate Least Recently Used victim selection for cache eviction.
//!
//! Instead of maintaining an access-ordered list on every read, the store
//! snapshots `(key, last_accessed_at, seq)` for its entries when it overflows
//! and picks the oldest ones here. Ties on access time fall back to write order.

use std::cmp::Ordering;

use tokio::time::Instant;

/// Fraction of the store evicted per overflow.
pub const EVICTION_FRACTION: f64 = 0.2;

// == LRU Candidate ==
/// Snapshot of one entry's recency, taken during an eviction scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LruCandidate {
    /// Entry key
    pub key: String,
    /// Last read or write
    pub last_accessed_at: Instant,
    /// Write sequence number
    pub seq: u64,
}

impl LruCandidate {
    fn recency_cmp(&self, other: &Self) -> Ordering {
        self.last_accessed_at
            .cmp(&other.last_accessed_at)
            .then(self.seq.cmp(&other.seq))
    }
}

// == Eviction Count ==
/// Number of entries to evict from a store holding `len` entries with room for `max`.
///
/// Evicts ~20% of the store, and never less than what is needed to get back
/// under `max`.
pub fn eviction_count(len: usize, max: usize) -> usize {
    if len <= max {
        return 0;
    }
    let fraction = ((len as f64) * EVICTION_FRACTION).ceil() as usize;
    fraction.max(len - max).min(len)
}

// == Least Recently Used ==
/// Returns the `count` least recently used candidates, oldest first.
pub fn least_recently_used(mut candidates: Vec<LruCandidate>, count: usize) -> Vec<LruCandidate> {
    if count == 0 || candidates.is_empty() {
        return Vec::new();
    }
    if count < candidates.len() {
        candidates.select_nth_unstable_by(count - 1, LruCandidate::recency_cmp);
        candidates.truncate(count);
    }
    candidates.sort_unstable_by(LruCandidate::recency_cmp);
    candidates
}
