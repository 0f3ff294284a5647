//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies. Stats are served
//! straight from the engine's `StatsSnapshot`.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::cache::HealthReport;

/// Response body for GET /get/:category/:key
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    /// The requested key
    pub key: String,
    /// The key's category
    pub category: String,
    /// The stored value
    pub value: Value,
}

impl GetResponse {
    /// Creates a new GetResponse
    pub fn new(key: impl Into<String>, category: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            category: category.into(),
            value,
        }
    }
}

/// Response body for POST /mget
///
/// Keys missing from both tiers are absent from `values`.
#[derive(Debug, Clone, Serialize)]
pub struct MgetResponse {
    pub category: String,
    pub values: HashMap<String, Value>,
}

/// Response body for the SET operation (PUT /set)
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    /// The key that was set
    pub key: String,
    /// The key's category
    pub category: String,
}

impl SetResponse {
    /// Creates a new SetResponse
    pub fn new(key: impl Into<String>, category: impl Into<String>) -> Self {
        let key = key.into();
        let category = category.into();
        Self {
            message: format!("Key '{}:{}' set successfully", category, key),
            key,
            category,
        }
    }
}

/// Response body for DELETE /del/:category/:key
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// The key that was deleted
    pub key: String,
    /// The key's category
    pub category: String,
}

impl DeleteResponse {
    /// Creates a new DeleteResponse
    pub fn new(key: impl Into<String>, category: impl Into<String>) -> Self {
        let key = key.into();
        let category = category.into();
        Self {
            message: format!("Key '{}:{}' deleted successfully", category, key),
            key,
            category,
        }
    }
}

/// Response body for DELETE /invalidate/:pattern
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub pattern: String,
    /// Removals summed over both tiers
    pub removed: usize,
}

/// Response body for POST /warmup
#[derive(Debug, Clone, Serialize)]
pub struct WarmupResponse {
    pub category: String,
    pub loaded: usize,
}

/// Response body for DELETE /clear and POST /stats/reset
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy", or "degraded" when the shared tier is unreachable
    pub status: String,
    /// Shared tier backend name
    pub shared_tier: String,
    /// Whether the shared tier answered a ping
    pub shared_available: bool,
    /// Entries held in the local tier
    pub local_entries: usize,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl From<HealthReport> for HealthResponse {
    fn from(report: HealthReport) -> Self {
        let status = if report.shared_available {
            "healthy"
        } else {
            "degraded"
        };
        Self {
            status: status.to_string(),
            shared_tier: report.shared_tier.to_string(),
            shared_available: report.shared_available,
            local_entries: report.local_entries,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
