// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Discussion Proxy Service
//!
//! Serves discussion data for a single GitHub repository to browser clients,
//! keeping the API token server-side.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables (and `.env` if present):
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `GITHUB_OWNER`, `GITHUB_REPO`, `GITHUB_TOKEN`: upstream repository and credential
//! - `ALLOWED_ORIGINS`: comma-separated CORS allow-list
//! - `REDIS_URL`: shared store; local files are used when unset or unreachable
//! - `WEBHOOK_SECRET`, `API_KEY`, `HMAC_SECRET`: optional request security
//! - `CACHE_TTL_SECS`, `CACHE_DIR`: response cache settings

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use discussion_proxy::{backend, config::Config, handlers::AppState, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env();
    info!(
        bind_addr = %config.bind_addr,
        owner = %config.upstream.owner,
        repo = %config.upstream.repo,
        cache_ttl_secs = config.cache.ttl_secs,
        storage_dir = %config.cache.storage_dir.display(),
        allowed_origins = config.cors.allowed_origins.len(),
        "Starting discussion proxy"
    );
    if config.upstream.token.is_none() {
        warn!("GITHUB_TOKEN is not set; discussion requests will fail until it is configured");
    }

    let backends = backend::select(&config).await;
    info!(
        rate_limiter = backends.limiter.name(),
        cache = backends.cache.name(),
        "Backends selected"
    );

    let addr: SocketAddr = config.bind_addr.parse()?;
    let state = Arc::new(AppState::new(config, backends)?);
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
