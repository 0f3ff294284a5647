//! Policy Registry Module
//!
//! Per-category TTL and compression policy, resolved once at construction.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

// == Cache Policy ==
/// TTL and compression settings for one category of keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Lifetime of an entry in the local tier
    pub local_ttl: Duration,
    /// Lifetime of an entry in the shared tier (never shorter than `local_ttl`)
    pub shared_ttl: Duration,
    /// Serialized payloads larger than this are compressed
    pub compression_threshold: usize,
}

impl CachePolicy {
    /// Creates a policy from second-granularity TTLs.
    pub fn from_secs(local_ttl: u64, shared_ttl: u64, compression_threshold: usize) -> Self {
        Self {
            local_ttl: Duration::from_secs(local_ttl),
            shared_ttl: Duration::from_secs(shared_ttl),
            compression_threshold,
        }
    }

    /// Raises `shared_ttl` to `local_ttl` when configured shorter.
    fn normalized(mut self, category: &str) -> Self {
        if self.shared_ttl < self.local_ttl {
            warn!(
                "Policy '{}': shared TTL {:?} is shorter than local TTL {:?}, raising it",
                category, self.shared_ttl, self.local_ttl
            );
            self.shared_ttl = self.local_ttl;
        }
        self
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::from_secs(60, 300, DEFAULT_COMPRESSION_THRESHOLD)
    }
}

/// Default compression threshold in bytes.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1024;

// == Policy Spec ==
/// Serializable form of a policy, used by configuration overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySpec {
    /// Local TTL in seconds
    pub local_ttl: u64,
    /// Shared TTL in seconds
    pub shared_ttl: u64,
    /// Compression threshold in bytes
    #[serde(default = "default_threshold")]
    pub compression_threshold: usize,
}

fn default_threshold() -> usize {
    DEFAULT_COMPRESSION_THRESHOLD
}

impl From<PolicySpec> for CachePolicy {
    fn from(spec: PolicySpec) -> Self {
        CachePolicy::from_secs(spec.local_ttl, spec.shared_ttl, spec.compression_threshold)
    }
}

// == Policy Registry ==
/// Immutable lookup table from category name to policy.
///
/// Unknown categories resolve to the default policy so write paths never fail
/// on an unrecognized category.
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    policies: HashMap<String, CachePolicy>,
    default: CachePolicy,
}

impl PolicyRegistry {
    /// Creates a registry with no named categories.
    pub fn new(default: CachePolicy) -> Self {
        Self {
            policies: HashMap::new(),
            default: default.normalized("default"),
        }
    }

    /// Builder-style registration of a category policy.
    pub fn with_policy(mut self, category: impl Into<String>, policy: CachePolicy) -> Self {
        let category = category.into();
        let policy = policy.normalized(&category);
        self.policies.insert(category, policy);
        self
    }

    /// Storefront categories: products, categories, users, inventory, search, analytics.
    pub fn storefront(default: CachePolicy) -> Self {
        let threshold = default.compression_threshold;
        Self::new(default)
            .with_policy("product", CachePolicy::from_secs(300, 1800, threshold))
            .with_policy("category", CachePolicy::from_secs(600, 3600, threshold))
            .with_policy("user", CachePolicy::from_secs(180, 900, threshold))
            .with_policy("inventory", CachePolicy::from_secs(30, 120, threshold))
            .with_policy("search", CachePolicy::from_secs(300, 1200, threshold))
            .with_policy("analytics", CachePolicy::from_secs(900, 7200, threshold))
    }

    /// Resolves the policy for a category, falling back to the default.
    pub fn resolve(&self, category: &str) -> &CachePolicy {
        self.policies.get(category).unwrap_or(&self.default)
    }

    /// Returns true if the category has an explicit policy.
    pub fn contains(&self, category: &str) -> bool {
        self.policies.contains_key(category)
    }

    /// Returns the fallback policy.
    pub fn default_policy(&self) -> &CachePolicy {
        &self.default
    }

    /// Iterates over named categories.
    pub fn categories(&self) -> impl Iterator<Item = (&str, &CachePolicy)> {
        self.policies.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::storefront(CachePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_category() {
        let registry = PolicyRegistry::default();
        let policy = registry.resolve("inventory");
        assert_eq!(policy.local_ttl, Duration::from_secs(30));
        assert_eq!(policy.shared_ttl, Duration::from_secs(120));
    }

    #[test]
    fn test_unknown_category_uses_default() {
        let registry = PolicyRegistry::new(CachePolicy::from_secs(5, 10, 64));
        assert!(!registry.contains("mystery"));
        assert_eq!(registry.resolve("mystery"), registry.default_policy());
        assert_eq!(registry.resolve("mystery").compression_threshold, 64);
    }

    #[test]
    fn test_shared_ttl_never_shorter_than_local() {
        let registry =
            PolicyRegistry::new(CachePolicy::default()).with_policy("odd", CachePolicy::from_secs(100, 10, 1024));
        let policy = registry.resolve("odd");
        assert_eq!(policy.shared_ttl, Duration::from_secs(100));
    }

    #[test]
    fn test_policy_spec_deserialize_default_threshold() {
        let spec: PolicySpec = serde_json::from_str(r#"{"local_ttl": 1, "shared_ttl": 2}"#).unwrap();
        let policy: CachePolicy = spec.into();
        assert_eq!(policy.compression_threshold, DEFAULT_COMPRESSION_THRESHOLD);
        assert_eq!(policy.shared_ttl, Duration::from_secs(2));
    }

    #[test]
    fn test_storefront_categories() {
        let registry = PolicyRegistry::default();
        let mut names: Vec<&str> = registry.categories().map(|(name, _)| name).collect();
        names.sort_unstable();
        assert_eq!(
            names,
            vec!["analytics", "category", "inventory", "product", "search", "user"]
        );
    }
}
