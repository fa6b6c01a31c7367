// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Token bucket rate limiter on the shared Redis store.
//!
//! The bucket lives in a Redis hash `{tokens, last_refill}` and the whole
//! refill-then-consume step runs as a single Lua script, so replicas sharing
//! the store cannot interleave their read-modify-write cycles.
//!
//! The script only runs against a live server:
//! `REDIS_URL=redis://127.0.0.1:6379 cargo test -- --ignored`.

use super::{sanitize_client_id, RateLimiter};
use crate::config::RateLimitConfig;
use crate::error::StoreError;
use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::Script;
use tracing::{debug, error};

const BUCKET_KEY_PREFIX: &str = "ratelimit:bucket:";

/// KEYS[1] bucket key
/// ARGV[1] max tokens, ARGV[2] refill interval (ms), ARGV[3] now (ms), ARGV[4] key ttl (s)
///
/// Refill adds floor(elapsed / interval) tokens and advances `last_refill` by
/// whole intervals only, so partial intervals carry over. A full bucket pins
/// `last_refill` to now.
const TOKEN_BUCKET_SCRIPT: &str = r"
local key = KEYS[1]
local max_tokens = tonumber(ARGV[1])
local interval = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

local state = redis.call('HMGET', key, 'tokens', 'last_refill')
local tokens = tonumber(state[1])
local last_refill = tonumber(state[2])
if tokens == nil or last_refill == nil then
  tokens = max_tokens
  last_refill = now
end

local elapsed = now - last_refill
if elapsed < 0 then
  elapsed = 0
end
local refill = math.floor(elapsed / interval)
if refill > 0 then
  tokens = math.min(max_tokens, tokens + refill)
  last_refill = last_refill + refill * interval
end
if tokens >= max_tokens then
  tokens = max_tokens
  last_refill = now
end

local allowed = 0
if tokens >= 1 then
  tokens = tokens - 1
  allowed = 1
end

redis.call('HSET', key, 'tokens', tokens, 'last_refill', last_refill)
redis.call('EXPIRE', key, ttl)
return allowed
";

pub struct TokenBucketLimiter {
    pool: Pool,
    script: Script,
    max_tokens: u32,
    refill_interval_ms: u64,
    key_ttl_secs: u64,
}

impl TokenBucketLimiter {
    pub fn new(pool: Pool, config: &RateLimitConfig) -> Self {
        let refill_interval = config.refill_interval();
        // Long enough for an idle bucket to refill completely
        let key_ttl_secs = refill_interval.as_secs() * u64::from(config.max_tokens) + 60;
        Self {
            pool,
            script: Script::new(TOKEN_BUCKET_SCRIPT),
            max_tokens: config.max_tokens,
            refill_interval_ms: refill_interval.as_millis() as u64,
            key_ttl_secs,
        }
    }

    /// Try to take a token for `client_id` at `now_ms` (unix milliseconds).
    ///
    /// Any store failure denies the request.
    pub async fn allow_at(&self, client_id: &str, now_ms: i64) -> bool {
        let key = format!("{BUCKET_KEY_PREFIX}{}", sanitize_client_id(client_id));
        match self.consume(&key, now_ms).await {
            Ok(allowed) => {
                if !allowed {
                    debug!(client = %client_id, "Token bucket empty");
                }
                allowed
            }
            Err(e) => {
                error!(client = %client_id, error = %e, "Rate-limit store unavailable, denying request");
                false
            }
        }
    }

    async fn consume(&self, key: &str, now_ms: i64) -> Result<bool, StoreError> {
        let mut conn = self.pool.get().await?;
        let allowed: i64 = self
            .script
            .key(key)
            .arg(self.max_tokens)
            .arg(self.refill_interval_ms)
            .arg(now_ms)
            .arg(self.key_ttl_secs)
            .invoke_async(&mut conn)
            .await?;
        Ok(allowed == 1)
    }
}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    async fn allow(&self, client_id: &str) -> bool {
        self.allow_at(client_id, chrono::Utc::now().timestamp_millis())
            .await
    }

    fn name(&self) -> &'static str {
        "token-bucket"
    }
}
