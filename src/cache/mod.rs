// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Response cache backends.
//!
//! Two implementations sit behind [`ResponseCache`]:
//! - [`FileCache`]: one file per key under the local storage directory
//! - [`RedisCache`]: expiring keys in the shared store
//!
//! The cache is advisory. Callers log a [`StoreError`] and carry on as if
//! the entry were absent.

mod file;
mod redis;

pub use self::file::FileCache;
pub use self::redis::RedisCache;

use crate::error::StoreError;
use crate::key::CacheKey;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Serialized response for `key`, or `None` when absent or expired.
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`.
    ///
    /// Backends with native expiry keep the entry for `ttl`. [`FileCache`]
    /// ages entries by mtime against the TTL it was constructed with and
    /// ignores `ttl`.
    async fn set(&self, key: &CacheKey, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Remove every entry whose key starts with `prefix`. Returns how many went.
    async fn invalidate(&self, prefix: &str) -> Result<usize, StoreError>;

    /// Backend name for logs and health output.
    fn name(&self) -> &'static str;
}
