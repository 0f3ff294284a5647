//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

use crate::cache::{DEFAULT_CATEGORY, MAX_KEY_LENGTH};

/// Checks a raw key against the HTTP-level limits.
pub fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "Key exceeds maximum length of {} characters",
            MAX_KEY_LENGTH
        ));
    }
    None
}

fn category_or_default(category: &Option<String>) -> &str {
    category.as_deref().unwrap_or(DEFAULT_CATEGORY)
}

/// Request body for the SET operation (PUT /set)
///
/// # Fields
/// - `key`: The raw key, namespaced under `category`
/// - `value`: Any JSON value
/// - `category`: Policy category (defaults to `"default"`)
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The cache key
    pub key: String,
    /// The value to store
    pub value: Value,
    /// Optional policy category
    #[serde(default)]
    pub category: Option<String>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_key(&self.key)
    }

    /// Category to store under.
    pub fn category(&self) -> &str {
        category_or_default(&self.category)
    }
}

/// Request body for POST /mget
#[derive(Debug, Clone, Deserialize)]
pub struct MgetRequest {
    /// Raw keys to fetch
    pub keys: Vec<String>,
    /// Optional policy category
    #[serde(default)]
    pub category: Option<String>,
}

impl MgetRequest {
    pub fn validate(&self) -> Option<String> {
        self.keys.iter().find_map(|key| validate_key(key))
    }

    pub fn category(&self) -> &str {
        category_or_default(&self.category)
    }
}

/// One key/value pair of a warm-up batch.
#[derive(Debug, Clone, Deserialize)]
pub struct WarmupEntry {
    pub key: String,
    pub value: Value,
}

/// Request body for POST /warmup
#[derive(Debug, Clone, Deserialize)]
pub struct WarmupRequest {
    /// Entries to load
    pub entries: Vec<WarmupEntry>,
    /// Optional policy category
    #[serde(default)]
    pub category: Option<String>,
}

impl WarmupRequest {
    pub fn validate(&self) -> Option<String> {
        if self.entries.is_empty() {
            return Some("Warm-up batch cannot be empty".to_string());
        }
        self.entries.iter().find_map(|entry| validate_key(&entry.key))
    }

    pub fn category(&self) -> &str {
        category_or_default(&self.category)
    }
}
