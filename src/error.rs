// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the discussion proxy.
//!
//! Every client-facing failure is rendered as a flat `{"error": "..."}` body.

use crate::upstream::UpstreamError;
use crate::validator::ValidationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Request-terminating errors.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Server misconfigured: {0}")]
    Configuration(String),

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("Internal server error (reference {correlation_id})")]
    Internal { correlation_id: Uuid },
}

/// Failures talking to a cache or rate-limit store. Never sent to clients.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration(_) | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Validation(err) => err.status_code(),
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Log an unexpected failure and return an opaque error carrying its reference.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        let correlation_id = Uuid::new_v4();
        tracing::error!(%correlation_id, error = %detail, "Unexpected failure");
        Self::Internal { correlation_id }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        if let Self::Configuration(ref detail) = self {
            tracing::error!(error = %detail, "Configuration error");
        }
        (
            self.status_code(),
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
