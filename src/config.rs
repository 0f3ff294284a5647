//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use tracing::warn;

use crate::cache::{CacheOptions, CachePolicy, PolicyRegistry, PolicySpec};

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of entries the local tier can hold
    pub max_local_entries: usize,
    /// Shared tier endpoint (`redis://...`); `None` selects the in-memory tier
    pub shared_tier_endpoint: Option<String>,
    /// Timeout in milliseconds for each shared tier call
    pub shared_tier_timeout_ms: u64,
    /// Timeout in milliseconds for a whole bulk removal (invalidate, clear)
    pub shared_tier_bulk_timeout_ms: u64,
    /// Capacity of the in-memory shared tier
    pub shared_tier_max_entries: usize,
    /// Namespace prefix for keys in the shared tier
    pub shared_key_prefix: String,
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Local TTL in seconds for categories without a policy
    pub default_local_ttl: u64,
    /// Shared TTL in seconds for categories without a policy
    pub default_shared_ttl: u64,
    /// Compression threshold in bytes
    pub compression_threshold: usize,
    /// Per-category overrides layered on the storefront policies
    pub policy_overrides: HashMap<String, PolicySpec>,
}

/// Reads and parses an environment variable, `None` when unset or invalid.
fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparseable {}={:?}", name, raw);
            None
        }
    }
}

/// Parses the `CACHE_POLICIES` JSON object.
fn parse_policies(raw: &str) -> HashMap<String, PolicySpec> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Ignoring invalid CACHE_POLICIES: {}", e);
        HashMap::new()
    })
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_LOCAL_ENTRIES` - Local tier capacity (default: 10000)
    /// - `SHARED_TIER_ENDPOINT` / `REDIS_URL` - Shared tier URL (default: in-memory)
    /// - `SHARED_TIER_TIMEOUT_MS` - Shared call timeout (default: 250)
    /// - `SHARED_TIER_BULK_TIMEOUT_MS` - Bulk removal timeout (default: 30000)
    /// - `SHARED_TIER_MAX_ENTRIES` - In-memory shared tier capacity (default: 100000)
    /// - `SHARED_KEY_PREFIX` - Shared key namespace (default: "tiered:")
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Expiry sweep frequency in seconds (default: 30)
    /// - `DEFAULT_LOCAL_TTL` / `DEFAULT_SHARED_TTL` - Fallback TTLs (default: 60 / 300)
    /// - `COMPRESSION_THRESHOLD` - Bytes before compression kicks in (default: 1024)
    /// - `CACHE_POLICIES` - JSON map of category to `{local_ttl, shared_ttl, compression_threshold}`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_local_entries: parse_var("MAX_LOCAL_ENTRIES").unwrap_or(defaults.max_local_entries),
            shared_tier_endpoint: env::var("SHARED_TIER_ENDPOINT")
                .or_else(|_| env::var("REDIS_URL"))
                .ok()
                .filter(|v| !v.trim().is_empty()),
            shared_tier_timeout_ms: parse_var("SHARED_TIER_TIMEOUT_MS")
                .unwrap_or(defaults.shared_tier_timeout_ms),
            shared_tier_bulk_timeout_ms: parse_var("SHARED_TIER_BULK_TIMEOUT_MS")
                .unwrap_or(defaults.shared_tier_bulk_timeout_ms),
            shared_tier_max_entries: parse_var("SHARED_TIER_MAX_ENTRIES")
                .unwrap_or(defaults.shared_tier_max_entries),
            shared_key_prefix: env::var("SHARED_KEY_PREFIX").unwrap_or(defaults.shared_key_prefix),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            cleanup_interval: parse_var("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
            default_local_ttl: parse_var("DEFAULT_LOCAL_TTL").unwrap_or(defaults.default_local_ttl),
            default_shared_ttl: parse_var("DEFAULT_SHARED_TTL")
                .unwrap_or(defaults.default_shared_ttl),
            compression_threshold: parse_var("COMPRESSION_THRESHOLD")
                .unwrap_or(defaults.compression_threshold),
            policy_overrides: env::var("CACHE_POLICIES")
                .map(|raw| parse_policies(&raw))
                .unwrap_or_default(),
        }
    }

    /// Engine options derived from this configuration.
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            max_local_entries: self.max_local_entries,
            shared_timeout: Duration::from_millis(self.shared_tier_timeout_ms),
            bulk_timeout: Duration::from_millis(self.shared_tier_bulk_timeout_ms),
        }
    }

    /// Storefront policies with the configured default and overrides applied.
    pub fn policy_registry(&self) -> PolicyRegistry {
        let default = CachePolicy::from_secs(
            self.default_local_ttl,
            self.default_shared_ttl,
            self.compression_threshold,
        );
        self.policy_overrides
            .iter()
            .fold(PolicyRegistry::storefront(default), |registry, (category, spec)| {
                registry.with_policy(category.clone(), CachePolicy::from(*spec))
            })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_local_entries: 10_000,
            shared_tier_endpoint: None,
            shared_tier_timeout_ms: 250,
            shared_tier_bulk_timeout_ms: 30_000,
            shared_tier_max_entries: 100_000,
            shared_key_prefix: "tiered:".to_string(),
            server_port: 3000,
            cleanup_interval: 30,
            default_local_ttl: 60,
            default_shared_ttl: 300,
            compression_threshold: 1024,
            policy_overrides: HashMap::new(),
        }
    }
}
