// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the discussion proxy.
//!
//! Every discussion request runs the same pipeline:
//! rate limit → CORS / preflight → webhook branch → validate → cache → upstream → cache store.

use crate::backend::Backends;
use crate::cache::ResponseCache;
use crate::config::Config;
use crate::cors::cors_headers;
use crate::error::ProxyError;
use crate::key::CacheKey;
use crate::limiter::RateLimiter;
use crate::metrics::Metrics;
use crate::upstream::UpstreamClient;
use crate::validator::RequestValidator;
use crate::webhook::{self, WebhookInvalidator};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Query, State},
    http::{header, HeaderMap, HeaderName, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

/// Shared application state. Immutable after startup.
pub struct AppState {
    pub config: Config,
    pub limiter: Arc<dyn RateLimiter>,
    pub cache: Arc<dyn ResponseCache>,
    pub validator: RequestValidator,
    pub upstream: UpstreamClient,
    pub webhook: WebhookInvalidator,
    pub metrics: Metrics,
}

impl AppState {
    /// Wire every component from the configuration and the selected backends.
    pub fn new(config: Config, backends: Backends) -> anyhow::Result<Self> {
        Ok(Self {
            limiter: backends.limiter,
            cache: backends.cache,
            validator: RequestValidator::new(config.security.clone()),
            upstream: UpstreamClient::new(config.upstream.clone())?,
            webhook: WebhookInvalidator::new(
                config.security.webhook_secret.clone(),
                backends.invalidation_targets,
            ),
            metrics: Metrics::new()?,
            config,
        })
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub rate_limiter: &'static str,
    pub cache: &'static str,
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route(
            "/",
            get(discussions).post(discussions).options(discussions),
        )
        .route(
            "/api/discussions",
            get(discussions).post(discussions).options(discussions),
        )
        .route("/health", get(health))
        .route("/healthz", get(health));

    if state.config.metrics.enabled {
        router = router.route(&state.config.metrics.path, get(render_metrics));
    }

    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "discussion-proxy",
        version: env!("CARGO_PKG_VERSION"),
        rate_limiter: state.limiter.name(),
        cache: state.cache.name(),
    })
}

/// Prometheus text exposition.
pub async fn render_metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => ProxyError::internal(e).into_response(),
    }
}

/// The proxy endpoint.
pub async fn discussions(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let client_id = addr.ip().to_string();
    if !state.limiter.allow(&client_id).await {
        info!(client = %client_id, backend = state.limiter.name(), "Request rate limited");
        state.metrics.record_rate_limited();
        state.metrics.record_request("rate_limited");
        return ProxyError::RateLimited.into_response();
    }

    let cors = cors_headers(&state.config.cors, headers.get(header::ORIGIN));

    let mut response = if method == Method::OPTIONS {
        state.metrics.record_request("preflight");
        StatusCode::NO_CONTENT.into_response()
    } else {
        let result = if params.get("webhook").map(String::as_str) == Some("1") {
            handle_webhook(&state, &method, &headers, &body).await
        } else {
            serve_discussions(&state, uri.path(), &params, &headers).await
        };

        match result {
            Ok(response) => {
                state.metrics.record_request("ok");
                response
            }
            Err(err) => {
                info!(
                    client = %client_id,
                    status = err.status_code().as_u16(),
                    error = %err,
                    "Request failed"
                );
                state.metrics.record_request("error");
                err.into_response()
            }
        }
    };

    response.headers_mut().extend(cors);
    response
}

async fn handle_webhook(
    state: &AppState,
    method: &Method,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, ProxyError> {
    if method != Method::POST {
        return Err(ProxyError::MethodNotAllowed);
    }

    let event = header_value(headers, webhook::EVENT_HEADER);
    let signature = header_value(headers, webhook::SIGNATURE_HEADER);
    debug!(event = ?event, body_len = body.len(), "Webhook delivery");

    state.webhook.handle(body, signature).await?;
    state.metrics.record_webhook_invalidation();
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn serve_discussions(
    state: &AppState,
    path: &str,
    params: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Result<Response, ProxyError> {
    if !state.upstream.is_configured() {
        return Err(ProxyError::Configuration(
            "upstream API token is not set".to_string(),
        ));
    }

    let query = state
        .validator
        .validate(path, params, headers, chrono::Utc::now().timestamp())?;
    let key = CacheKey::for_query(&query);
    let ttl = state.config.cache.ttl();

    match state.cache.get(&key).await {
        Ok(Some(body)) => {
            debug!(key = %key, "cache hit");
            state.metrics.record_cache("hit");
            return Ok(json_response(body, ttl.as_secs(), "HIT"));
        }
        Ok(None) => {
            debug!(key = %key, "cache miss");
            state.metrics.record_cache("miss");
        }
        Err(e) => {
            warn!(key = %key, backend = state.cache.name(), error = %e, "Cache read failed");
            state.metrics.record_cache("error");
        }
    }

    let payload = state.upstream.call(&query).await.map_err(|e| {
        state.metrics.record_upstream_failure(e.kind());
        e
    })?;
    let body = serde_json::to_string(&payload).map_err(ProxyError::internal)?;

    if let Err(e) = state.cache.set(&key, &body, ttl).await {
        warn!(key = %key, backend = state.cache.name(), error = %e, "Cache write failed");
        state.metrics.record_cache("error");
    }

    Ok(json_response(body, ttl.as_secs(), "MISS"))
}

fn json_response(body: String, max_age: u64, cache_status: &'static str) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CACHE_CONTROL, format!("public, max-age={max_age}")),
            (HeaderName::from_static("x-cache"), cache_status.to_string()),
        ],
        body,
    )
        .into_response()
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Turn a handler panic into an opaque 500 carrying a correlation id.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    ProxyError::internal(detail).into_response()
}
