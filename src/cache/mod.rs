//! Cache Module
//!
//! Two-tier caching: a bounded in-process tier with TTL expiry and approximate
//! LRU eviction, backed by a larger shared tier (Redis or in-memory).

pub mod codec;
mod engine;
mod entry;
mod lru;
pub mod pattern;
pub mod policy;
mod redis_tier;
pub mod shared;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use codec::EncodedValue;
pub use engine::{qualified_key, CacheOptions, HealthReport, TieredCache};
pub use entry::CacheEntry;
pub use pattern::KeyPattern;
pub use policy::{CachePolicy, PolicyRegistry, PolicySpec};
pub use redis_tier::RedisSharedTier;
pub use shared::{InMemorySharedTier, SharedTier};
pub use stats::{CacheStats, CounterSnapshot, StatsSnapshot};
pub use store::EntryStore;

// == Public Constants ==
/// Maximum allowed raw key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Category used when a request does not name one
pub const DEFAULT_CATEGORY: &str = "default";
