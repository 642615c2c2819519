//! Redis-backed persistent cache.

use async_trait::async_trait;
use quarry_core::{Error, PersistentCache, Result};
use redis::aio::ConnectionManager;
use std::time::Duration;

use crate::config::StoreConfig;

fn redis_err(e: redis::RedisError) -> Error {
    Error::persistence(format!("redis: {e}"))
}

/// [`PersistentCache`] over a shared Redis instance.
///
/// Values are plain strings written with `SET key value EX ttl`. Pattern
/// deletes walk the keyspace with `SCAN MATCH` so the server is never
/// blocked by `KEYS`.
pub struct RedisPersistentCache {
    conn: ConnectionManager,
    scan_count: usize,
}

impl RedisPersistentCache {
    /// Connect using `config.redis_url`.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let url = config
            .redis_url
            .as_deref()
            .ok_or_else(|| Error::config("store.redis_url is not set"))?;
        let client = redis::Client::open(url).map_err(redis_err)?;
        let conn = ConnectionManager::new(client).await.map_err(redis_err)?;
        log::info!("Connected to Redis persistent cache");
        Ok(Self {
            conn,
            scan_count: config.scan_count,
        })
    }
}

/// TTL in whole seconds; Redis rejects `EX 0`.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl PersistentCache for RedisPersistentCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(redis_err)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async::<()>(&mut conn)
            .await
            .map_err(redis_err)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(self.scan_count)
                .query_async(&mut conn)
                .await
                .map_err(redis_err)?;

            if !keys.is_empty() {
                let removed: u64 = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(redis_err)?;
                deleted += removed;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        log::debug!("Deleted {deleted} Redis keys matching '{pattern}'");
        Ok(deleted)
    }

    fn name(&self) -> &str {
        "redis"
    }
}
