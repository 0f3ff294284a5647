//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the engine's correctness properties over generated
//! keys, values and operation sequences.

use proptest::prelude::*;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::cache::{
    codec, CacheEntry, CacheOptions, EntryStore, InMemorySharedTier, KeyPattern, PolicyRegistry,
    TieredCache,
};

// == Test Configuration ==
const TEST_MAX_ENTRIES: usize = 100;
const TEST_TTL: Duration = Duration::from_secs(300);

// == Helpers ==
/// Runs a future on a paused current-thread runtime.
fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
        .block_on(future)
}

fn engine(max_local: usize) -> TieredCache {
    let options = CacheOptions {
        max_local_entries: max_local,
        shared_timeout: Duration::from_millis(200),
        bulk_timeout: Duration::from_secs(2),
    };
    TieredCache::new(
        options,
        PolicyRegistry::default(),
        Arc::new(InMemorySharedTier::default()),
    )
}

fn store_entry(key: &str, value: &str) -> CacheEntry {
    CacheEntry::new(key, codec::encode(value, 1024).unwrap(), "test", TEST_TTL)
}

// == Strategies ==
/// Generates raw cache keys
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,64}"
}

/// Generates cache values, some large and repetitive enough to compress
fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[a-zA-Z0-9 ]{0,256}".prop_map(Value::String),
        any::<i64>().prop_map(|n| json!(n)),
        ("[a-z]{1,8}", 1usize..400).prop_map(|(word, n)| json!({ "text": word.repeat(n) })),
        Just(Value::Null),
    ]
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: Value },
    Get { key: String },
    Delete { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    // Small key space so operations collide
    let key = "k[0-9]";
    prop_oneof![
        (key, value_strategy()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        key.prop_map(|key| CacheOp::Get { key }),
        key.prop_map(|key| CacheOp::Delete { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Any value survives encode/decode at any threshold
    #[test]
    fn prop_codec_roundtrip(value in value_strategy(), threshold in 0usize..2048) {
        let encoded = codec::encode(&value, threshold).unwrap();
        if encoded.is_compressed {
            prop_assert!(encoded.original_size > threshold);
            prop_assert!(encoded.payload.len() < encoded.original_size);
        }

        let decoded: Value = encoded.decode().unwrap();
        prop_assert_eq!(&decoded, &value);

        let reframed = codec::EncodedValue::from_frame(encoded.to_frame()).unwrap();
        prop_assert_eq!(reframed, encoded);
    }

    // get after set returns the stored value
    #[test]
    fn prop_roundtrip_storage(key in valid_key_strategy(), value in value_strategy()) {
        let cache = engine(TEST_MAX_ENTRIES);
        let retrieved: Option<Value> = block_on(async {
            cache.set(&key, &value, "product").await.unwrap();
            cache.get(&key, "product").await.unwrap()
        });
        prop_assert_eq!(retrieved, Some(value));
    }

    // A second set fully replaces the first
    #[test]
    fn prop_overwrite_semantics(
        key in valid_key_strategy(),
        first in value_strategy(),
        second in value_strategy()
    ) {
        let cache = engine(TEST_MAX_ENTRIES);
        let retrieved: Option<Value> = block_on(async {
            cache.set(&key, &first, "product").await.unwrap();
            cache.set(&key, &second, "product").await.unwrap();
            cache.get(&key, "product").await.unwrap()
        });
        prop_assert_eq!(retrieved, Some(second));
        prop_assert_eq!(cache.local().len(), 1);
    }

    // The local tier never holds more than its capacity after a put returns
    #[test]
    fn prop_capacity_enforcement(
        keys in prop::collection::vec(valid_key_strategy(), 1..200)
    ) {
        let max_entries = 50;
        let store = EntryStore::new(max_entries);

        for key in keys {
            store.put(store_entry(&key, "v"));
            prop_assert!(
                store.len() <= max_entries,
                "Store size {} exceeds max {}",
                store.len(),
                max_entries
            );
        }
    }

    // Counters agree with a simple model of the operation sequence
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..50)) {
        let cache = engine(TEST_MAX_ENTRIES);
        let mut present = HashSet::new();
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        let stats = block_on(async {
            for op in ops {
                match op {
                    CacheOp::Set { key, value } => {
                        cache.set(&key, &value, "product").await.unwrap();
                        present.insert(key);
                    }
                    CacheOp::Get { key } => {
                        let found: Option<Value> = cache.get(&key, "product").await.unwrap();
                        assert_eq!(found.is_some(), present.contains(&key));
                        if found.is_some() {
                            expected_hits += 1;
                        } else {
                            expected_misses += 1;
                        }
                    }
                    CacheOp::Delete { key } => {
                        cache.delete(&key, "product").await;
                        present.remove(&key);
                    }
                }
            }
            cache.stats().await
        });

        prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
        prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
        prop_assert_eq!(stats.total_requests, expected_hits + expected_misses);
        prop_assert_eq!(stats.local_entries, present.len());
    }

    // Invalidating a pattern removes exactly the matching keys from both tiers
    #[test]
    fn prop_pattern_invalidation(
        products in prop::collection::hash_set("[a-z0-9]{1,12}", 0..20),
        orders in prop::collection::hash_set("[a-z0-9]{1,12}", 0..20)
    ) {
        let cache = engine(TEST_MAX_ENTRIES);

        let (removed, survivors) = block_on(async {
            for id in &products {
                cache.set(&format!("product:{}", id), &1, "catalog").await.unwrap();
            }
            for id in &orders {
                cache.set(&format!("order:{}", id), &2, "catalog").await.unwrap();
            }

            let removed = cache.invalidate("catalog:product:*").await;

            let mut survivors = 0;
            for id in &products {
                let key = format!("product:{}", id);
                if cache.get::<i32>(&key, "catalog").await.unwrap().is_some() {
                    survivors += 1;
                }
            }
            for id in &orders {
                let key = format!("order:{}", id);
                assert_eq!(cache.get::<i32>(&key, "catalog").await.unwrap(), Some(2));
            }
            (removed, survivors)
        });

        prop_assert_eq!(removed, products.len() * 2);
        prop_assert_eq!(survivors, 0);
    }

    // Matching never depends on anything but the key
    #[test]
    fn prop_substring_pattern_matches_contains(key in "[a-z:]{0,20}", needle in "[a-z:]{1,4}") {
        let pattern = KeyPattern::parse(&needle);
        prop_assert_eq!(pattern.matches(&key), key.contains(needle.as_str()));
    }
}

// LRU behavior under a controlled clock
proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    // A touched entry outlives untouched entries inserted before it
    #[test]
    fn prop_lru_access_tracking(
        keys in prop::collection::hash_set(valid_key_strategy(), 3..8),
        new_key in valid_key_strategy()
    ) {
        let keys: Vec<String> = keys.into_iter().collect();
        prop_assume!(!keys.contains(&new_key));

        let capacity = keys.len();
        let store = EntryStore::new(capacity);

        let (evicted, touched_alive, new_alive, oldest_alive) = block_on(async {
            for key in &keys {
                store.put(store_entry(key, "v"));
                tokio::time::advance(Duration::from_millis(10)).await;
            }

            store.get(&keys[0]);
            tokio::time::advance(Duration::from_millis(10)).await;

            let evicted = store.put(store_entry(&new_key, "v"));
            (
                evicted,
                store.peek(&keys[0]).is_some(),
                store.peek(&new_key).is_some(),
                store.peek(&keys[1]).is_some(),
            )
        });

        prop_assert!(evicted >= 1);
        prop_assert!(touched_alive, "touched key was evicted");
        prop_assert!(new_alive, "new key was evicted");

        // The oldest untouched key always goes first
        prop_assert!(!oldest_alive);
    }
}

// Error responses always carry a JSON body with an "error" string
proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_error_response_format(error_msg in "[a-zA-Z0-9 _-]{1,100}") {
        use crate::error::CacheError;
        use axum::body::to_bytes;
        use axum::response::IntoResponse;

        let error_variants = vec![
            CacheError::NotFound(error_msg.clone()),
            CacheError::Codec(error_msg.clone()),
            CacheError::SharedTierUnavailable(error_msg.clone()),
            CacheError::InvalidRequest(error_msg.clone()),
            CacheError::Internal(error_msg.clone()),
        ];

        for error in error_variants {
            let expected_msg = error.to_string();
            let response = error.into_response();

            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok());
            prop_assert!(
                content_type.map(|ct| ct.contains("application/json")).unwrap_or(false),
                "Response should have JSON content-type"
            );

            let bytes = block_on(async { to_bytes(response.into_body(), usize::MAX).await.unwrap() });
            let json: Value = serde_json::from_slice(&bytes).unwrap();
            prop_assert_eq!(json["error"].as_str(), Some(expected_msg.as_str()));
        }
    }
}
