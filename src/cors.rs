// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! CORS origin reflection against a fixed allow-list.

use crate::config::CorsConfig;
use axum::http::{header, HeaderMap, HeaderValue};

const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
const ALLOW_HEADERS: &str =
    "Content-Type, X-API-KEY, X-SIGNATURE, X-TIMESTAMP, X-Hub-Signature-256";

/// Response headers for a request carrying `origin`.
///
/// Empty unless `origin` matches an allow-list entry exactly.
pub fn cors_headers(config: &CorsConfig, origin: Option<&HeaderValue>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let Some(origin) = origin else {
        return headers;
    };
    let Ok(origin_str) = origin.to_str() else {
        return headers;
    };
    if !config.allowed_origins.iter().any(|allowed| allowed == origin_str) {
        return headers;
    }

    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers
}
