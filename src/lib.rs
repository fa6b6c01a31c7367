// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Discussion Proxy
//!
//! A caching, rate-limited HTTP proxy in front of the GitHub Discussions API:
//!
//! - Per-client rate limiting (Redis token bucket, or a local fixed window)
//! - Response caching (Redis, or local files) keyed by request fingerprint
//! - Parameter validation plus optional API key and HMAC request signing
//! - CORS origin reflection against an allow-list
//! - Signed webhook deliveries that purge the cache

pub mod backend;
pub mod cache;
pub mod config;
pub mod cors;
pub mod error;
pub mod handlers;
pub mod key;
pub mod limiter;
pub mod metrics;
pub mod upstream;
pub mod validator;
pub mod webhook;

pub use cache::ResponseCache;
pub use config::Config;
pub use error::{ProxyError, StoreError};
pub use handlers::{router, AppState};
pub use limiter::RateLimiter;
pub use validator::{DiscussionQuery, RequestKind, RequestValidator};
