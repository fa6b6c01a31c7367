// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Per-client rate limiting.
//!
//! Two backends implement [`RateLimiter`]:
//! 1. [`FixedWindowLimiter`]: a counter per client in local storage, reset
//!    when the window elapses
//! 2. [`TokenBucketLimiter`]: a token bucket per client in Redis, refilled
//!    and consumed by one atomic server-side script
//!
//! Coordination between requests (and between instances) happens only in
//! the backing store; limiters hold no per-client state in memory.

mod fixed_window;
mod token_bucket;

pub use fixed_window::FixedWindowLimiter;
pub use token_bucket::TokenBucketLimiter;

use async_trait::async_trait;

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Whether `client_id` may make another request now.
    async fn allow(&self, client_id: &str) -> bool;

    /// Backend name for logs and health output.
    fn name(&self) -> &'static str;
}

/// Reduce a client identifier to characters safe for file names and keys.
pub(crate) fn sanitize_client_id(client_id: &str) -> String {
    let sanitized: String = client_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_client_id() {
        assert_eq!(sanitize_client_id("192.168.1.10"), "192.168.1.10");
        assert_eq!(sanitize_client_id("::1"), "__1");
        assert_eq!(sanitize_client_id("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_client_id(""), "unknown");
    }
}
