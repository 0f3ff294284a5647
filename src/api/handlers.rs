//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::cache::{
    CacheOptions, InMemorySharedTier, PolicyRegistry, RedisSharedTier, SharedTier, StatsSnapshot,
    TieredCache,
};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    validate_key, DeleteResponse, GetResponse, HealthResponse, InvalidateResponse,
    MessageResponse, MgetRequest, MgetResponse, SetRequest, SetResponse, WarmupRequest,
    WarmupResponse,
};

/// Application state shared across all handlers.
///
/// The engine synchronizes internally, so handlers share it through a plain `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Shared engine handle
    pub cache: Arc<TieredCache>,
}

impl AppState {
    /// Creates a new AppState around an engine.
    pub fn new(cache: TieredCache) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }

    /// Engine with an in-memory shared tier.
    pub fn in_memory(options: CacheOptions, policies: PolicyRegistry) -> Self {
        Self::new(TieredCache::new(
            options,
            policies,
            Arc::new(InMemorySharedTier::default()),
        ))
    }

    /// Creates a new AppState from configuration.
    ///
    /// Connects to the configured shared tier endpoint, falling back to the
    /// in-memory tier when none is configured or the connection fails.
    pub async fn from_config(config: &Config) -> Self {
        let shared: Arc<dyn SharedTier> = match &config.shared_tier_endpoint {
            Some(endpoint) => {
                let connect = RedisSharedTier::connect(
                    endpoint,
                    config.shared_key_prefix.clone(),
                    Duration::from_millis(config.shared_tier_timeout_ms),
                );
                match connect.await {
                    Ok(tier) => Arc::new(tier),
                    Err(e) => {
                        warn!(
                            "Shared tier at {} unreachable ({}), using in-memory tier",
                            endpoint, e
                        );
                        Arc::new(InMemorySharedTier::new(config.shared_tier_max_entries))
                    }
                }
            }
            None => {
                info!("No shared tier endpoint configured, using in-memory tier");
                Arc::new(InMemorySharedTier::new(config.shared_tier_max_entries))
            }
        };

        Self::new(TieredCache::new(
            config.cache_options(),
            config.policy_registry(),
            shared,
        ))
    }
}

/// Rejects path keys that break the HTTP limits before they reach the engine.
fn check_path_key(key: &str) -> Result<()> {
    match validate_key(key) {
        Some(error_msg) => Err(CacheError::InvalidRequest(error_msg)),
        None => Ok(()),
    }
}

/// Handler for PUT /set
///
/// Stores a JSON value under `category:key` in both tiers.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let category = req.category();
    state.cache.set(&req.key, &req.value, category).await?;

    Ok(Json(SetResponse::new(&req.key, category)))
}

/// Handler for GET /get/:category/:key
///
/// Retrieves a value, falling through to the shared tier on a local miss.
pub async fn get_handler(
    State(state): State<AppState>,
    Path((category, key)): Path<(String, String)>,
) -> Result<Json<GetResponse>> {
    check_path_key(&key)?;
    match state.cache.get::<Value>(&key, &category).await? {
        Some(value) => Ok(Json(GetResponse::new(key, category, value))),
        None => Err(CacheError::NotFound(format!("{}:{}", category, key))),
    }
}

/// Handler for POST /mget
pub async fn mget_handler(
    State(state): State<AppState>,
    Json(req): Json<MgetRequest>,
) -> Result<Json<MgetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let category = req.category();
    let values: HashMap<String, Value> = state.cache.mget(req.keys.as_slice(), category).await?;

    Ok(Json(MgetResponse {
        category: category.to_string(),
        values,
    }))
}

/// Handler for DELETE /del/:category/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path((category, key)): Path<(String, String)>,
) -> Result<Json<DeleteResponse>> {
    check_path_key(&key)?;
    if state.cache.delete(&key, &category).await {
        Ok(Json(DeleteResponse::new(key, category)))
    } else {
        Err(CacheError::NotFound(format!("{}:{}", category, key)))
    }
}

/// Handler for DELETE /invalidate/:pattern
///
/// `*` clears both tiers; a pattern containing `*` is a glob over
/// fully-qualified keys; anything else is a substring match.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(pattern): Path<String>,
) -> Result<Json<InvalidateResponse>> {
    if pattern.is_empty() {
        return Err(CacheError::InvalidRequest(
            "Pattern cannot be empty".to_string(),
        ));
    }

    let removed = state.cache.invalidate(&pattern).await;
    Ok(Json(InvalidateResponse { pattern, removed }))
}

/// Handler for POST /warmup
pub async fn warmup_handler(
    State(state): State<AppState>,
    Json(req): Json<WarmupRequest>,
) -> Result<Json<WarmupResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let category = req.category().to_string();
    let entries = req.entries.into_iter().map(|entry| (entry.key, entry.value));
    let loaded = state.cache.warmup(entries, &category).await?;

    Ok(Json(WarmupResponse { category, loaded }))
}

/// Handler for DELETE /clear
///
/// Empties both tiers and resets the statistics.
pub async fn clear_handler(State(state): State<AppState>) -> Json<MessageResponse> {
    state.cache.clear().await;
    Json(MessageResponse::new("Cache cleared"))
}

/// Handler for POST /stats/reset
pub async fn reset_stats_handler(State(state): State<AppState>) -> Json<MessageResponse> {
    state.cache.reset_stats();
    Json(MessageResponse::new("Statistics reset"))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.cache.stats().await)
}

/// Handler for GET /health
///
/// Always answers 200; a failing shared tier reports `degraded`.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::from(state.cache.health().await))
}
