// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Shared-store cache on Redis.

use super::ResponseCache;
use crate::error::StoreError;
use crate::key::CacheKey;
use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::debug;

/// Keys fetched per `SCAN` round during invalidation.
const SCAN_BATCH: usize = 100;

#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResponseCache for RedisCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, StoreError> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.get(key.as_str()).await?;
        debug!(key = %key, hit = value.is_some(), "cache lookup (redis)");
        Ok(value)
    }

    async fn set(&self, key: &CacheKey, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key.as_str(), value, ttl_secs).await?;
        debug!(key = %key, ttl_secs, "cache set (redis)");
        Ok(())
    }

    async fn invalidate(&self, prefix: &str) -> Result<usize, StoreError> {
        let mut conn = self.pool.get().await?;
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut removed = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: usize = conn.del(&keys).await?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(removed, prefix, "cache invalidated (redis)");
        Ok(removed)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::CACHE_KEY_PREFIX;
    use crate::validator::RequestKind;

    fn test_pool() -> Option<Pool> {
        let url = std::env::var("REDIS_URL").ok()?;
        deadpool_redis::Config::from_url(url)
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .ok()
    }

    #[tokio::test]
    #[ignore] // Requires Redis at REDIS_URL
    async fn test_round_trip_and_invalidate() {
        let cache = RedisCache::new(test_pool().expect("REDIS_URL must be set"));
        let key = CacheKey::new(RequestKind::Search, Some("redis test"), None);

        cache.set(&key, "{\"n\":1}", Duration::from_secs(30)).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some("{\"n\":1}"));

        let removed = cache.invalidate(CACHE_KEY_PREFIX).await.unwrap();
        assert!(removed >= 1);
        assert!(cache.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore] // Requires Redis at REDIS_URL
    async fn test_entry_expires() {
        let cache = RedisCache::new(test_pool().expect("REDIS_URL must be set"));
        let key = CacheKey::new(RequestKind::Rest, Some("expiry"), None);

        cache.set(&key, "{}", Duration::from_secs(1)).await.unwrap();
        assert!(cache.get(&key).await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(cache.get(&key).await.unwrap().is_none());
    }
}
