// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fixed-window counter backed by local files.
//!
//! Each client gets `<dir>/<sanitized id>.json` holding the window start and
//! the count inside it. Concurrent writers are not serialized; the last
//! rename wins, which makes the limit approximate under races.

use super::{sanitize_client_id, RateLimiter};
use crate::config::RateLimitConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Persisted counter for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct WindowCounter {
    /// Unix seconds when the current window opened
    window_start: i64,
    /// Requests counted in the current window
    count: u32,
}

impl WindowCounter {
    fn fresh(now: i64) -> Self {
        Self {
            window_start: now,
            count: 0,
        }
    }
}

pub struct FixedWindowLimiter {
    dir: PathBuf,
    max_requests: u32,
    window_secs: i64,
}

impl FixedWindowLimiter {
    /// Create a limiter storing its counters under `dir`.
    pub fn new(dir: impl Into<PathBuf>, config: &RateLimitConfig) -> Self {
        Self {
            dir: dir.into(),
            max_requests: config.max_requests,
            window_secs: config.window_secs as i64,
        }
    }

    /// Count a request from `client_id` at `now` (unix seconds).
    pub async fn check_at(&self, client_id: &str, now: i64) -> bool {
        let path = self.state_path(client_id);
        let mut counter = load_counter(&path).await.unwrap_or_else(|| WindowCounter::fresh(now));

        if now - counter.window_start >= self.window_secs {
            counter = WindowCounter::fresh(now);
        }

        if counter.count >= self.max_requests {
            debug!(client = %client_id, count = counter.count, "Fixed window limit exceeded");
            return false;
        }

        counter.count += 1;
        if let Err(e) = self.store_counter(&path, &counter).await {
            warn!(client = %client_id, error = %e, "Failed to persist rate-limit counter");
        }
        true
    }

    fn state_path(&self, client_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_client_id(client_id)))
    }

    async fn store_counter(&self, path: &Path, counter: &WindowCounter) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let body = serde_json::to_vec(counter)?;
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4()));
        fs::write(&tmp, body).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }
}

/// Missing, unreadable or corrupt state all read as `None`.
async fn load_counter(path: &Path) -> Option<WindowCounter> {
    let raw = fs::read(path).await.ok()?;
    match serde_json::from_slice(&raw) {
        Ok(counter) => Some(counter),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Discarding unreadable rate-limit state");
            None
        }
    }
}

#[async_trait]
impl RateLimiter for FixedWindowLimiter {
    async fn allow(&self, client_id: &str) -> bool {
        self.check_at(client_id, chrono::Utc::now().timestamp()).await
    }

    fn name(&self) -> &'static str {
        "fixed-window"
    }
}
