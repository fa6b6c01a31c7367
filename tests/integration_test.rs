// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Integration tests for the discussion proxy, driven through the router.

use axum::{
    body::{to_bytes, Body},
    extract::connect_info::MockConnectInfo,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use discussion_proxy::{backend::Backends, config::Config, router, webhook, AppState};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ORIGIN: &str = "https://blog.example";
const REST_PATH: &str = "/repos/acme/site/discussions";

struct TestApp {
    app: Router,
    upstream: MockServer,
    _dir: TempDir,
}

async fn spawn_app(customize: impl FnOnce(&mut Config)) -> TestApp {
    let upstream = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.upstream.api_url = upstream.uri();
    config.upstream.owner = "acme".to_string();
    config.upstream.repo = "site".to_string();
    config.upstream.token = Some("test-token".to_string());
    config.cors.allowed_origins = vec![ORIGIN.to_string()];
    config.cache.storage_dir = dir.path().to_path_buf();
    customize(&mut config);

    let backends = Backends::local(&config);
    let state = Arc::new(AppState::new(config, backends).unwrap());
    let app = router(state).layer(MockConnectInfo(SocketAddr::from(([203, 0, 113, 7], 4000))));

    TestApp {
        app,
        upstream,
        _dir: dir,
    }
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::ORIGIN, ORIGIN)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_rest_miss_then_hit() {
    let t = spawn_app(|_| {}).await;
    Mock::given(method("GET"))
        .and(path(REST_PATH))
        .and(query_param("per_page", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"number": 1}])))
        .expect(1)
        .mount(&t.upstream)
        .await;

    let first = send(&t.app, get("/api/discussions?type=rest")).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-cache"], "MISS");
    assert_eq!(first.headers()[header::CACHE_CONTROL], "public, max-age=300");
    assert_eq!(json_body(first).await, json!([{"number": 1}]));

    // Served from cache; the mock verifies a single upstream call on drop
    let second = send(&t.app, get("/?type=rest")).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(json_body(second).await, json!([{"number": 1}]));
}

#[tokio::test]
async fn test_graphql_returns_data_and_rejects_errors() {
    let t = spawn_app(|_| {}).await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"repository": {"discussions": {"nodes": []}}}
        })))
        .expect(1)
        .mount(&t.upstream)
        .await;

    let response = send(&t.app, get("/api/discussions")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({"repository": {"discussions": {"nodes": []}}})
    );

    let failing = spawn_app(|_| {}).await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{"message": "Could not resolve to a Repository"}]
        })))
        .mount(&failing.upstream)
        .await;

    let response = send(&failing.app, get("/api/discussions?type=graphql")).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(json_body(response).await["error"].is_string());
}

#[tokio::test]
async fn test_upstream_status_is_bad_gateway() {
    let t = spawn_app(|_| {}).await;
    Mock::given(method("GET"))
        .and(path(REST_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})))
        .mount(&t.upstream)
        .await;

    let response = send(&t.app, get("/api/discussions?type=rest")).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_cors_reflects_only_allowed_origin() {
    let t = spawn_app(|_| {}).await;

    let allowed = send(&t.app, get("/api/discussions?type=bogus")).await;
    assert_eq!(allowed.status(), StatusCode::BAD_REQUEST);
    assert_eq!(allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], ORIGIN);
    assert_eq!(allowed.headers()[header::VARY], "Origin");

    let request = Request::builder()
        .uri("/api/discussions?type=bogus")
        .header(header::ORIGIN, "https://evil.example")
        .body(Body::empty())
        .unwrap();
    let denied = send(&t.app, request).await;
    assert!(denied.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn test_preflight_is_no_content() {
    let t = spawn_app(|_| {}).await;
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/discussions")
        .header(header::ORIGIN, ORIGIN)
        .body(Body::empty())
        .unwrap();

    let response = send(&t.app, request).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], ORIGIN);
    assert!(response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
}

#[tokio::test]
async fn test_search_validation() {
    let t = spawn_app(|_| {}).await;
    let long = "a".repeat(201);

    for uri in [
        "/api/discussions?type=search".to_string(),
        "/api/discussions?type=search&q=%20%20".to_string(),
        format!("/api/discussions?type=search&q={long}"),
        "/api/discussions?type=search&q=%3Cscript%3E".to_string(),
    ] {
        let response = send(&t.app, get(&uri)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn test_signed_search() {
    let t = spawn_app(|config| {
        config.security.api_key = Some("key-1".to_string());
        config.security.hmac_secret = Some("sign-me".to_string());
    })
    .await;
    Mock::given(method("GET"))
        .and(path("/search/issues"))
        .and(query_param("q", "repo:acme/site type:discussions rust"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_count": 0, "items": []})))
        .expect(1)
        .mount(&t.upstream)
        .await;

    let timestamp = chrono::Utc::now().timestamp().to_string();
    let mut mac = Hmac::<Sha256>::new_from_slice(b"sign-me").unwrap();
    mac.update(format!("/api/discussions|rust|{timestamp}").as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    let signed = Request::builder()
        .uri("/api/discussions?type=search&q=rust")
        .header("x-api-key", "key-1")
        .header("x-signature", &signature)
        .header("x-timestamp", &timestamp)
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&t.app, signed).await.status(), StatusCode::OK);

    let no_key = get("/api/discussions?type=search&q=rust");
    assert_eq!(send(&t.app, no_key).await.status(), StatusCode::UNAUTHORIZED);

    let bad_signature = Request::builder()
        .uri("/api/discussions?type=search&q=rust")
        .header("x-api-key", "key-1")
        .header("x-signature", "00".repeat(32))
        .header("x-timestamp", &timestamp)
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&t.app, bad_signature).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_webhook_clears_cache() {
    let t = spawn_app(|config| {
        config.security.webhook_secret = Some("hook-secret".to_string());
    })
    .await;
    Mock::given(method("GET"))
        .and(path(REST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&t.upstream)
        .await;

    let warm = send(&t.app, get("/api/discussions?type=rest")).await;
    assert_eq!(warm.headers()["x-cache"], "MISS");

    let body = r#"{"action":"created"}"#;
    let bad = Request::builder()
        .method("POST")
        .uri("/api/discussions?webhook=1")
        .header(webhook::SIGNATURE_HEADER, webhook::sign("wrong", body.as_bytes()))
        .body(Body::from(body))
        .unwrap();
    assert_eq!(send(&t.app, bad).await.status(), StatusCode::UNAUTHORIZED);

    let still_cached = send(&t.app, get("/api/discussions?type=rest")).await;
    assert_eq!(still_cached.headers()["x-cache"], "HIT");

    let good = Request::builder()
        .method("POST")
        .uri("/api/discussions?webhook=1")
        .header(webhook::EVENT_HEADER, "discussion")
        .header(webhook::SIGNATURE_HEADER, webhook::sign("hook-secret", body.as_bytes()))
        .body(Body::from(body))
        .unwrap();
    assert_eq!(send(&t.app, good).await.status(), StatusCode::NO_CONTENT);

    let refetched = send(&t.app, get("/api/discussions?type=rest")).await;
    assert_eq!(refetched.headers()["x-cache"], "MISS");
}

#[tokio::test]
async fn test_webhook_without_secret_or_wrong_method() {
    let t = spawn_app(|_| {}).await;
    let body = r#"{"action":"created"}"#;

    let unconfigured = Request::builder()
        .method("POST")
        .uri("/?webhook=1")
        .header(webhook::SIGNATURE_HEADER, webhook::sign("anything", body.as_bytes()))
        .body(Body::from(body))
        .unwrap();
    assert_eq!(send(&t.app, unconfigured).await.status(), StatusCode::FORBIDDEN);

    let wrong_method = send(&t.app, get("/?webhook=1")).await;
    assert_eq!(wrong_method.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_rate_limit_exhaustion() {
    let t = spawn_app(|config| {
        config.rate_limit.max_requests = 2;
        config.rate_limit.window_secs = 3600;
    })
    .await;

    let preflight = || {
        Request::builder()
            .method("OPTIONS")
            .uri("/api/discussions")
            .body(Body::empty())
            .unwrap()
    };

    for i in 0..2 {
        let response = send(&t.app, preflight()).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT, "Request {} should be allowed", i + 1);
    }

    let limited = send(&t.app, preflight()).await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(json_body(limited).await["error"].is_string());
}

#[tokio::test]
async fn test_missing_token_is_configuration_error() {
    let t = spawn_app(|config| config.upstream.token = None).await;
    Mock::given(method("GET"))
        .and(path(REST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&t.upstream)
        .await;

    let response = send(&t.app, get("/api/discussions?type=rest")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(!body["error"].as_str().unwrap().contains("test-token"));
}

#[tokio::test]
async fn test_health_and_metrics() {
    let t = spawn_app(|_| {}).await;

    let health = send(&t.app, get("/health")).await;
    assert_eq!(health.status(), StatusCode::OK);
    let body = json_body(health).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["rate_limiter"], "fixed-window");
    assert_eq!(body["cache"], "file");

    send(&t.app, get("/api/discussions?type=bogus")).await;
    let metrics = send(&t.app, get("/metrics")).await;
    assert_eq!(metrics.status(), StatusCode::OK);
    let bytes = to_bytes(metrics.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("proxy_requests_total{outcome=\"error\"} 1"));
}
