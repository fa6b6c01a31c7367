// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the discussion proxy.
//!
//! Everything is resolved once at startup from the process environment and
//! handed to component constructors. Nothing reads the environment after that.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Configuration for the discussion proxy service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Upstream GitHub API settings
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// CORS allow-list
    #[serde(default)]
    pub cors: CorsConfig,

    /// Shared store connection string (Redis). `None` forces local backends.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Secrets gating the webhook and search endpoints
    #[serde(default)]
    pub security: SecurityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Response cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Upstream repository and credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// API base URL (default: https://api.github.com)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Repository owner
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Repository name
    #[serde(default = "default_repo")]
    pub repo: String,

    /// API token. Requests fail with a configuration error while unset.
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins reflected back verbatim when they match exactly
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Optional shared secrets. Absent values disable the matching check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default, skip_serializing)]
    pub webhook_secret: Option<String>,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing)]
    pub hmac_secret: Option<String>,
}

/// Rate limiting configuration for both limiter backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Fixed window: maximum requests per window per client (default: 60)
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Fixed window: window length in seconds (default: 60)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Token bucket: bucket capacity (default: 60)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Token bucket: seconds per refilled token (default: 1)
    #[serde(default = "default_refill_secs")]
    pub refill_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry time-to-live in seconds (default: 300)
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Directory for the local cache and rate-limit state
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_owner() -> String {
    "octocat".to_string()
}

fn default_repo() -> String {
    "hello-world".to_string()
}

fn default_max_requests() -> u32 {
    60
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    60
}

fn default_refill_secs() -> u64 {
    1
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_storage_dir() -> PathBuf {
    std::env::temp_dir().join("discussion-proxy")
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            upstream: UpstreamConfig::default(),
            cors: CorsConfig::default(),
            redis_url: None,
            security: SecurityConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            owner: default_owner(),
            repo: default_repo(),
            token: None,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            max_tokens: default_max_tokens(),
            refill_interval_secs: default_refill_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            storage_dir: default_storage_dir(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl RateLimitConfig {
    /// Get the fixed window duration
    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Get the token refill interval
    pub fn refill_interval(&self) -> Duration {
        Duration::from_secs(self.refill_interval_secs.max(1))
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let storage_dir = string("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_storage_dir);

        Config {
            bind_addr: string("BIND_ADDR").unwrap_or_else(default_bind_addr),
            upstream: UpstreamConfig {
                api_url: string("GITHUB_API_URL").unwrap_or_else(default_api_url),
                owner: string("GITHUB_OWNER").unwrap_or_else(default_owner),
                repo: string("GITHUB_REPO").unwrap_or_else(default_repo),
                token: string("GITHUB_TOKEN"),
            },
            cors: CorsConfig {
                allowed_origins: string("ALLOWED_ORIGINS")
                    .map(|v| parse_origins(&v))
                    .unwrap_or_default(),
            },
            redis_url: string("REDIS_URL"),
            security: SecurityConfig {
                webhook_secret: string("WEBHOOK_SECRET"),
                api_key: string("API_KEY"),
                hmac_secret: string("HMAC_SECRET"),
            },
            rate_limit: RateLimitConfig {
                max_requests: parse_or(&lookup, "RATE_LIMIT_MAX_REQUESTS", default_max_requests()),
                window_secs: parse_or(&lookup, "RATE_LIMIT_WINDOW_SECS", default_window_secs()),
                max_tokens: parse_or(&lookup, "TOKEN_BUCKET_MAX_TOKENS", default_max_tokens()),
                refill_interval_secs: parse_or(
                    &lookup,
                    "TOKEN_BUCKET_REFILL_SECS",
                    default_refill_secs(),
                ),
            },
            cache: CacheConfig {
                ttl_secs: parse_or(&lookup, "CACHE_TTL_SECS", default_ttl_secs()),
                storage_dir: resolve_storage_dir(&storage_dir),
            },
            metrics: MetricsConfig {
                enabled: parse_or(&lookup, "METRICS_ENABLED", default_true()),
                ..Default::default()
            },
        }
    }
}

/// Parse a variable, falling back to the default when unset or malformed.
fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(variable = name, value = %raw, "Ignoring malformed value, using default");
                default
            }
        },
        None => default,
    }
}

/// Split a comma-separated origin list.
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/').to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

/// Use `preferred` if it is writable, otherwise an application-local directory.
fn resolve_storage_dir(preferred: &Path) -> PathBuf {
    if is_writable(preferred) {
        return preferred.to_path_buf();
    }
    let fallback = PathBuf::from(".cache").join("discussion-proxy");
    warn!(
        preferred = %preferred.display(),
        fallback = %fallback.display(),
        "Storage directory not writable, falling back to local directory"
    );
    fallback
}

fn is_writable(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(format!(".probe-{}", uuid::Uuid::new_v4()));
    match std::fs::write(&probe, b"") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}
