// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Backend selection.
//!
//! Decided once at startup: when `REDIS_URL` is set and a connection can be
//! checked out, the token bucket and Redis cache are used; otherwise the
//! file-backed fixed window and file cache. The choice holds for the process
//! lifetime.

use crate::cache::{FileCache, RedisCache, ResponseCache};
use crate::config::Config;
use crate::limiter::{FixedWindowLimiter, RateLimiter, TokenBucketLimiter};
use deadpool_redis::{Pool, Runtime};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Timeout for shared-store pool checkout and connection setup.
const STORE_TIMEOUT: Duration = Duration::from_secs(1);

/// The selected rate limiter and cache, plus every cache a webhook must purge.
pub struct Backends {
    pub limiter: Arc<dyn RateLimiter>,
    pub cache: Arc<dyn ResponseCache>,
    pub invalidation_targets: Vec<Arc<dyn ResponseCache>>,
}

impl Backends {
    /// File-backed limiter and cache under the configured storage directory.
    pub fn local(config: &Config) -> Self {
        let dir = &config.cache.storage_dir;
        let cache: Arc<dyn ResponseCache> =
            Arc::new(FileCache::new(dir.join("cache"), config.cache.ttl()));
        Self {
            limiter: Arc::new(FixedWindowLimiter::new(dir.join("ratelimit"), &config.rate_limit)),
            cache: cache.clone(),
            invalidation_targets: vec![cache],
        }
    }

    /// Redis-backed limiter and cache. The local file cache stays an
    /// invalidation target in case entries were written before Redis came up.
    pub fn shared(config: &Config, pool: Pool) -> Self {
        let local: Arc<dyn ResponseCache> = Arc::new(FileCache::new(
            config.cache.storage_dir.join("cache"),
            config.cache.ttl(),
        ));
        let cache: Arc<dyn ResponseCache> = Arc::new(RedisCache::new(pool.clone()));
        Self {
            limiter: Arc::new(TokenBucketLimiter::new(pool, &config.rate_limit)),
            cache: cache.clone(),
            invalidation_targets: vec![cache, local],
        }
    }
}

/// Pick backends based on whether the shared store is configured and reachable.
pub async fn select(config: &Config) -> Backends {
    let Some(url) = config.redis_url.as_deref() else {
        info!("No shared store configured, using local backends");
        return Backends::local(config);
    };

    match connect(url).await {
        Some(pool) => {
            info!("Connected to shared store, using token bucket and Redis cache");
            Backends::shared(config, pool)
        }
        None => Backends::local(config),
    }
}

async fn connect(url: &str) -> Option<Pool> {
    let mut redis_config = deadpool_redis::Config::from_url(url);
    let mut pool_config = redis_config.pool.take().unwrap_or_default();
    pool_config.timeouts.wait = Some(STORE_TIMEOUT);
    pool_config.timeouts.create = Some(STORE_TIMEOUT);
    pool_config.timeouts.recycle = Some(STORE_TIMEOUT);
    redis_config.pool = Some(pool_config);

    let pool = match redis_config.create_pool(Some(Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            warn!(error = %e, "Failed to create Redis pool. Falling back to local backends.");
            return None;
        }
    };

    match pool.get().await {
        Ok(_) => Some(pool),
        Err(e) => {
            warn!(error = %e, "Failed to connect to Redis. Falling back to local backends.");
            None
        }
    }
}
