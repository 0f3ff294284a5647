//! Tiered Cache - a two-tier cache engine and HTTP server
//!
//! A bounded in-process tier with TTL expiry and approximate LRU eviction,
//! backed by a shared tier (Redis or in-memory), with per-category TTL and
//! compression policies.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::TieredCache;
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::spawn_cleanup_task;
