//! Entry Store Module
//!
//! One cache tier's storage: a sharded concurrent map from fully-qualified key
//! to [`CacheEntry`], with lazy TTL expiry and approximate LRU eviction.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::lru::{eviction_count, least_recently_used, LruCandidate};
use crate::cache::pattern::KeyPattern;
use crate::cache::CacheEntry;

// == Entry Store ==
/// Concurrent entry storage for a single tier.
///
/// Each key lives in one `DashMap` shard, so reads and writes on unrelated
/// keys do not contend. Only eviction is serialized, and only against other
/// evictions.
#[derive(Debug)]
pub struct EntryStore {
    /// Key-entry storage
    entries: DashMap<String, CacheEntry>,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// Source of write sequence numbers
    next_seq: AtomicU64,
    /// Held while an eviction pass runs
    evict_lock: Mutex<()>,
}

impl EntryStore {
    // == Constructor ==
    /// Creates a new store holding at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            next_seq: AtomicU64::new(1),
            evict_lock: Mutex::new(()),
        }
    }

    // == Get ==
    /// Returns a copy of the entry and refreshes its access time.
    ///
    /// Absent and expired keys both return `None`; an expired entry is
    /// deleted on the way out.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = Instant::now();

        match self.entries.get_mut(key) {
            None => return None,
            Some(mut entry) => {
                if !entry.is_expired_at(now) {
                    entry.last_accessed_at = now;
                    return Some(entry.value().clone());
                }
            }
        }

        self.remove_expired(key, now);
        None
    }

    // == Peek ==
    /// Like [`get`](Self::get) but leaves the access time untouched.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        let now = Instant::now();

        match self.entries.get(key) {
            None => return None,
            Some(entry) => {
                if !entry.is_expired_at(now) {
                    return Some(entry.value().clone());
                }
            }
        }

        self.remove_expired(key, now);
        None
    }

    fn remove_expired(&self, key: &str, now: Instant) {
        // A concurrent put may have replaced the expired entry meanwhile
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired_at(now))
            .is_some()
        {
            debug!("Removed expired entry '{}' on access", key);
        }
    }

    // == Put ==
    /// Inserts or fully replaces an entry.
    ///
    /// Returns the number of entries evicted to make room.
    pub fn put(&self, mut entry: CacheEntry) -> usize {
        entry.seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(entry.key.clone(), entry);

        if self.entries.len() > self.max_entries {
            self.evict()
        } else {
            0
        }
    }

    // == Insert If Vacant ==
    /// Inserts the entry only when the key is absent or its entry has expired.
    ///
    /// Returns the assigned write seq and the number of entries evicted, or
    /// `None` when a live entry already occupies the key.
    pub fn insert_if_vacant(&self, mut entry: CacheEntry) -> Option<(u64, usize)> {
        let now = Instant::now();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        entry.seq = seq;

        match self.entries.entry(entry.key.clone()) {
            Entry::Occupied(mut slot) => {
                if !slot.get().is_expired_at(now) {
                    return None;
                }
                slot.insert(entry);
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
        }

        let evicted = if self.entries.len() > self.max_entries {
            self.evict()
        } else {
            0
        };
        Some((seq, evicted))
    }

    /// Removes the entry only if it still carries write seq `seq`.
    pub fn remove_version(&self, key: &str, seq: u64) -> bool {
        self.entries
            .remove_if(key, |_, entry| entry.seq == seq)
            .is_some()
    }

    // == Evict ==
    /// Brings the store back under capacity.
    ///
    /// Expired entries go first; if that is not enough, the least recently
    /// accessed ~20% of entries are removed.
    pub fn evict(&self) -> usize {
        let _guard = self.evict_lock.lock();

        if self.entries.len() <= self.max_entries {
            return 0;
        }

        let expired = self.purge_expired();
        let count = eviction_count(self.entries.len(), self.max_entries);
        if count == 0 {
            return 0;
        }

        let candidates: Vec<LruCandidate> = self
            .entries
            .iter()
            .map(|item| LruCandidate {
                key: item.key().clone(),
                last_accessed_at: item.last_accessed_at,
                seq: item.seq,
            })
            .collect();

        let removed = self.remove_victims(least_recently_used(candidates, count));
        debug!(
            "Evicted {} entries ({} expired purged), {} remain",
            removed,
            expired,
            self.entries.len()
        );
        removed
    }

    /// Removes victims whose entry has not been rewritten since selection.
    fn remove_victims(&self, victims: Vec<LruCandidate>) -> usize {
        victims
            .into_iter()
            .filter(|victim| {
                self.entries
                    .remove_if(&victim.key, |_, entry| entry.seq == victim.seq)
                    .is_some()
            })
            .count()
    }

    // == Delete ==
    /// Removes an entry by key. Returns true if it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    // == Delete Matching ==
    /// Removes every entry whose key matches the pattern.
    ///
    /// Returns the number of entries removed.
    pub fn delete_matching(&self, pattern: &KeyPattern) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, _| {
            let matched = pattern.matches(key);
            if matched {
                removed += 1;
            }
            !matched
        });
        removed
    }

    // == Purge Expired ==
    /// Removes all expired entries.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let expired = entry.is_expired_at(now);
            if expired {
                removed += 1;
            }
            !expired
        });
        removed
    }

    // == Clear ==
    /// Removes all entries. Returns how many there were.
    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    // == Length ==
    /// Returns the current number of entries, including not-yet-purged expired ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of stored payload sizes in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.entries
            .iter()
            .map(|item| item.payload.len() as u64)
            .sum()
    }

    /// Configured capacity.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::codec;
    use std::sync::Arc;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(300);

    fn entry(key: &str, value: &str, ttl: Duration) -> CacheEntry {
        let encoded = codec::encode(value, 1024).unwrap();
        CacheEntry::new(key, encoded, "test", ttl)
    }

    fn value_of(store: &EntryStore, key: &str) -> Option<String> {
        store
            .get(key)
            .map(|e| e.encoded().decode::<String>().unwrap())
    }

    #[test]
    fn test_store_new() {
        let store = EntryStore::new(100);
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.max_entries(), 100);
    }

    #[test]
    fn test_store_put_and_get() {
        let store = EntryStore::new(100);
        store.put(entry("key1", "value1", TTL));

        assert_eq!(value_of(&store, "key1"), Some("value1".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let store = EntryStore::new(100);
        assert!(store.get("nonexistent").is_none());
    }

    #[test]
    fn test_store_overwrite_resets_entry() {
        let store = EntryStore::new(100);
        store.put(entry("key1", "value1", TTL));
        let first = store.peek("key1").unwrap();

        store.put(entry("key1", "value2", TTL));
        let second = store.peek("key1").unwrap();

        assert_eq!(value_of(&store, "key1"), Some("value2".to_string()));
        assert_eq!(store.len(), 1);
        assert!(second.seq > first.seq);
    }

    #[test]
    fn test_store_delete() {
        let store = EntryStore::new(100);
        store.put(entry("key1", "value1", TTL));

        assert!(store.delete("key1"));
        assert!(!store.delete("key1"));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_ttl_expiration_removes_on_access() {
        let store = EntryStore::new(100);
        store.put(entry("key1", "value1", Duration::from_secs(1)));
        assert!(store.get("key1").is_some());

        tokio::time::advance(Duration::from_millis(1100)).await;

        // Still physically present until accessed
        assert_eq!(store.len(), 1);
        assert!(store.get("key1").is_none());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_purge_expired() {
        let store = EntryStore::new(100);
        store.put(entry("short", "v", Duration::from_secs(1)));
        store.put(entry("long", "v", Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("long").is_some());
    }

    #[test]
    fn test_store_eviction_bound() {
        let store = EntryStore::new(10);
        let mut evicted = 0;
        for i in 0..25 {
            evicted += store.put(entry(&format!("key{}", i), "v", TTL));
            assert!(store.len() <= 10, "store grew to {}", store.len());
        }
        assert_eq!(store.len() + evicted, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_evicts_least_recently_accessed() {
        let store = EntryStore::new(5);
        for i in 0..5 {
            store.put(entry(&format!("key{}", i), "v", TTL));
            tokio::time::advance(Duration::from_millis(10)).await;
        }

        // key0 becomes the most recently used
        store.get("key0");
        tokio::time::advance(Duration::from_millis(10)).await;

        // 6 entries, evicts ceil(1.2) = 2: key1 and key2
        let evicted = store.put(entry("key5", "v", TTL));
        assert_eq!(evicted, 2);
        assert!(store.peek("key0").is_some());
        assert!(store.peek("key1").is_none());
        assert!(store.peek("key2").is_none());
        assert!(store.peek("key5").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_eviction_prefers_expired() {
        let store = EntryStore::new(3);
        store.put(entry("doomed", "v", Duration::from_secs(1)));
        store.put(entry("a", "v", TTL));
        store.put(entry("b", "v", TTL));

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.put(entry("c", "v", TTL)), 0);
        assert!(store.peek("doomed").is_none());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_evicting_stale_snapshot_keeps_newer_put() {
        let store = EntryStore::new(100);
        store.put(entry("key", "old", TTL));
        let stale = store.peek("key").unwrap();

        store.put(entry("key", "new", TTL));

        let removed = store.remove_victims(vec![LruCandidate {
            key: "key".to_string(),
            last_accessed_at: stale.last_accessed_at,
            seq: stale.seq,
        }]);
        assert_eq!(removed, 0);
        assert_eq!(value_of(&store, "key"), Some("new".to_string()));
    }

    #[test]
    fn test_insert_if_vacant_keeps_live_entry() {
        let store = EntryStore::new(100);
        store.put(entry("key", "newer", TTL));

        assert!(store.insert_if_vacant(entry("key", "older", TTL)).is_none());
        assert_eq!(value_of(&store, "key"), Some("newer".to_string()));

        assert!(store.insert_if_vacant(entry("other", "v", TTL)).is_some());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_if_vacant_replaces_expired_entry() {
        let store = EntryStore::new(100);
        store.put(entry("key", "stale", Duration::from_secs(1)));
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(store.insert_if_vacant(entry("key", "fresh", TTL)).is_some());
        assert_eq!(value_of(&store, "key"), Some("fresh".to_string()));
    }

    #[test]
    fn test_remove_version_ignores_rewritten_entry() {
        let store = EntryStore::new(100);
        let (seq, _) = store.insert_if_vacant(entry("key", "v1", TTL)).unwrap();
        store.put(entry("key", "v2", TTL));

        assert!(!store.remove_version("key", seq));
        assert_eq!(value_of(&store, "key"), Some("v2".to_string()));

        let current = store.peek("key").unwrap().seq;
        assert!(store.remove_version("key", current));
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_delete_matching() {
        let store = EntryStore::new(100);
        store.put(entry("product:1", "a", TTL));
        store.put(entry("product:2", "b", TTL));
        store.put(entry("order:1", "c", TTL));

        assert_eq!(store.delete_matching(&KeyPattern::parse("product")), 2);
        assert!(store.get("order:1").is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_clear() {
        let store = EntryStore::new(100);
        store.put(entry("a", "1", TTL));
        store.put(entry("b", "2", TTL));

        assert_eq!(store.clear(), 2);
        assert_eq!(store.clear(), 0);
        assert!(store.is_empty());
        assert_eq!(store.size_bytes(), 0);
    }

    #[test]
    fn test_store_size_bytes() {
        let store = EntryStore::new(100);
        store.put(entry("a", "1234", TTL));
        // "\"1234\"" serializes to 6 bytes
        assert_eq!(store.size_bytes(), 6);
    }

    #[test]
    fn test_store_concurrent_access() {
        let store = Arc::new(EntryStore::new(50));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("t{}:{}", t, i % 40);
                        store.put(entry(&key, "v", TTL));
                        store.get(&key);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("thread should not panic");
        }

        assert!(store.len() <= 50);
    }
}
