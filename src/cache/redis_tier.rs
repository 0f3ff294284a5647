//! Redis Shared Tier
//!
//! Shared tier backed by a Redis server through a multiplexed
//! `ConnectionManager`, which reconnects on its own after failures.
//!
//! Every key is stored under a namespace prefix so `clear` and pattern
//! invalidation never touch keys owned by other applications.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use redis::FromRedisValue;
use tracing::{debug, info, warn};

use crate::cache::pattern::KeyPattern;
use crate::cache::shared::SharedTier;
use crate::error::{CacheError, Result};

/// Keys requested per SCAN iteration.
const SCAN_BATCH: usize = 500;

/// Keeps the keys that live under `prefix` and whose un-prefixed form matches
/// `pattern`. SCAN MATCH is coarser than [`KeyPattern`], so every page is
/// filtered again here.
fn filter_prefixed(prefix: &str, pattern: &KeyPattern, keys: Vec<String>) -> Vec<String> {
    keys.into_iter()
        .filter(|key| {
            key.strip_prefix(prefix)
                .map(|raw| pattern.matches(raw))
                .unwrap_or(false)
        })
        .collect()
}

// == Redis Shared Tier ==
/// Redis-backed shared tier.
#[derive(Clone)]
pub struct RedisSharedTier {
    conn: ConnectionManager,
    prefix: String,
    /// Bound on each round trip of a multi-command sweep
    call_timeout: Duration,
}

impl RedisSharedTier {
    // == Connect ==
    /// Connects to `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(
        url: &str,
        prefix: impl Into<String>,
        call_timeout: Duration,
    ) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        let prefix = prefix.into();
        info!("Connected to Redis shared tier at {} (prefix '{}')", url, prefix);
        Ok(Self {
            conn,
            prefix,
            call_timeout,
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Runs one command, bounded by `call_timeout`.
    async fn round_trip<T: FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T> {
        let mut conn = self.conn.clone();
        match tokio::time::timeout(self.call_timeout, cmd.query_async(&mut conn)).await {
            Ok(reply) => Ok(reply?),
            Err(_) => Err(CacheError::SharedTierUnavailable(format!(
                "round trip exceeded {:?}",
                self.call_timeout
            ))),
        }
    }

    /// Walks the keyspace one SCAN page at a time, deleting each page's
    /// matches before fetching the next. `removed` is kept current so callers
    /// can report partial progress when a later round trip fails.
    async fn sweep(&self, pattern: &KeyPattern, removed: &mut usize) -> Result<()> {
        let glob = pattern.to_redis_glob(&self.prefix);
        let mut cursor: u64 = 0;

        loop {
            let mut scan = redis::cmd("SCAN");
            scan.arg(cursor)
                .arg("MATCH")
                .arg(&glob)
                .arg("COUNT")
                .arg(SCAN_BATCH);
            let (next, page): (u64, Vec<String>) = self.round_trip(&scan).await?;

            let keys = filter_prefixed(&self.prefix, pattern, page);
            if !keys.is_empty() {
                let mut del = redis::cmd("DEL");
                del.arg(keys);
                let count: usize = self.round_trip(&del).await?;
                *removed += count;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!("Sweep '{}' removed {} keys", glob, removed);
        Ok(())
    }
}

#[async_trait]
impl SharedTier for RedisSharedTier {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(self.namespaced(key))
            .query_async(&mut conn)
            .await?;
        Ok(value.map(Bytes::from))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let namespaced: Vec<String> = keys.iter().map(|key| self.namespaced(key)).collect();
        let mut conn = self.conn.clone();
        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(namespaced)
            .query_async(&mut conn)
            .await?;
        Ok(values.into_iter().map(|v| v.map(Bytes::from)).collect())
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        let ttl_ms = (ttl.as_millis() as u64).max(1);
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(self.namespaced(key))
            .arg(value.to_vec())
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: usize = redis::cmd("DEL")
            .arg(self.namespaced(key))
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn delete_matching(&self, pattern: &KeyPattern) -> Result<usize> {
        let mut removed = 0;
        match self.sweep(pattern, &mut removed).await {
            Ok(()) => Ok(removed),
            Err(e) if removed > 0 => {
                warn!("Redis sweep stopped after {} removals: {}", removed, e);
                Ok(removed)
            }
            Err(e) => Err(e),
        }
    }

    async fn clear(&self) -> Result<usize> {
        self.delete_matching(&KeyPattern::All).await
    }

    /// Counting would need a full keyspace scan; not reported.
    async fn entry_count(&self) -> Result<Option<usize>> {
        Ok(None)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
