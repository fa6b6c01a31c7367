// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Discussion request validator.
//!
//! Turns raw query parameters and headers into a [`DiscussionQuery`]:
//! - request kind (`type`, case-insensitive, defaults to graphql)
//! - opaque pagination cursor (`after`)
//! - search terms (`q`) with length and character-class checks
//! - optional API key and HMAC request signing for the search kind

use crate::config::SecurityConfig;
use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Maximum length of a search query in characters.
pub const MAX_QUERY_CHARS: usize = 200;

/// Accepted clock skew for signed search requests.
pub const SIGNATURE_WINDOW_SECS: i64 = 300;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const SIGNATURE_HEADER: &str = "x-signature";
pub const TIMESTAMP_HEADER: &str = "x-timestamp";

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid request type '{0}': expected graphql, rest or search")]
    UnknownKind(String),

    #[error("Search requires a non-empty 'q' parameter (missing query)")]
    MissingQuery,

    #[error("Search query too long: at most {} characters allowed", MAX_QUERY_CHARS)]
    QueryTooLong,

    #[error("Search query contains invalid characters")]
    InvalidCharacters,

    #[error("Missing API key")]
    MissingApiKey,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Missing request signature or timestamp")]
    MissingSignature,

    #[error("Request timestamp outside the accepted window")]
    StaleTimestamp,

    #[error("Invalid request signature")]
    InvalidSignature,
}

impl ValidationError {
    /// Parameter problems are 400; credential problems are 401.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownKind(_)
            | Self::MissingQuery
            | Self::QueryTooLong
            | Self::InvalidCharacters => StatusCode::BAD_REQUEST,
            Self::MissingApiKey
            | Self::InvalidApiKey
            | Self::MissingSignature
            | Self::StaleTimestamp
            | Self::InvalidSignature => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Which upstream shape a request is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Graphql,
    Rest,
    Search,
}

impl RequestKind {
    /// Parse the `type` parameter. Absent means graphql.
    pub fn parse(raw: Option<&str>) -> Result<Self, ValidationError> {
        let Some(raw) = raw else {
            return Ok(Self::Graphql);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "graphql" => Ok(Self::Graphql),
            "rest" => Ok(Self::Rest),
            "search" => Ok(Self::Search),
            _ => Err(ValidationError::UnknownKind(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Graphql => "graphql",
            Self::Rest => "rest",
            Self::Search => "search",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscussionQuery {
    pub kind: RequestKind,
    /// Search terms, only set for [`RequestKind::Search`]
    pub query: Option<String>,
    /// Pagination cursor, only used by [`RequestKind::Graphql`]
    pub cursor: Option<String>,
}

/// Discussion request validator.
pub struct RequestValidator {
    config: SecurityConfig,
}

impl RequestValidator {
    /// Create a new validator with the given secrets.
    pub fn new(config: SecurityConfig) -> Self {
        Self { config }
    }

    /// Validate a complete request at server time `now` (unix seconds).
    pub fn validate(
        &self,
        path: &str,
        params: &HashMap<String, String>,
        headers: &HeaderMap,
        now: i64,
    ) -> Result<DiscussionQuery, ValidationError> {
        let kind = RequestKind::parse(params.get("type").map(String::as_str))?;
        // Only GraphQL paginates; anything else would just split the cache
        let cursor = params
            .get("after")
            .filter(|c| kind == RequestKind::Graphql && !c.is_empty())
            .cloned();

        if kind != RequestKind::Search {
            return Ok(DiscussionQuery {
                kind,
                query: None,
                cursor,
            });
        }

        let query = validate_search_query(params.get("q").map(String::as_str))?;
        self.check_api_key(headers)?;
        self.check_signature(path, &query, headers, now)?;

        debug!(query = %query, "Search request valid");
        Ok(DiscussionQuery {
            kind,
            query: Some(query),
            cursor: None,
        })
    }

    /// Exact API key match, when a key is configured.
    pub fn check_api_key(&self, headers: &HeaderMap) -> Result<(), ValidationError> {
        let Some(expected) = self.config.api_key.as_deref() else {
            return Ok(());
        };
        let provided = header_str(headers, API_KEY_HEADER).ok_or(ValidationError::MissingApiKey)?;
        if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
            Ok(())
        } else {
            debug!("API key mismatch");
            Err(ValidationError::InvalidApiKey)
        }
    }

    /// HMAC over `{path}|{query}|{timestamp}`, when a secret is configured.
    pub fn check_signature(
        &self,
        path: &str,
        query: &str,
        headers: &HeaderMap,
        now: i64,
    ) -> Result<(), ValidationError> {
        let Some(secret) = self.config.hmac_secret.as_deref() else {
            return Ok(());
        };
        let signature = header_str(headers, SIGNATURE_HEADER);
        let timestamp = header_str(headers, TIMESTAMP_HEADER);
        let (Some(signature), Some(timestamp)) = (signature, timestamp) else {
            return Err(ValidationError::MissingSignature);
        };

        let ts: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| ValidationError::StaleTimestamp)?;
        if now.abs_diff(ts) > SIGNATURE_WINDOW_SECS.unsigned_abs() {
            debug!(timestamp = ts, now, "Signed request outside window");
            return Err(ValidationError::StaleTimestamp);
        }

        let provided = hex::decode(signature.trim()).map_err(|_| ValidationError::InvalidSignature)?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| ValidationError::InvalidSignature)?;
        mac.update(signing_payload(path, query, timestamp.trim()).as_bytes());
        mac.verify_slice(&provided)
            .map_err(|_| ValidationError::InvalidSignature)
    }
}

/// Check the search query rules in order: presence, length, character class.
pub fn validate_search_query(raw: Option<&str>) -> Result<String, ValidationError> {
    let query = raw.map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Err(ValidationError::MissingQuery);
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(ValidationError::QueryTooLong);
    }
    if !query.chars().all(is_query_char) {
        return Err(ValidationError::InvalidCharacters);
    }
    Ok(query.to_string())
}

fn is_query_char(c: char) -> bool {
    c.is_alphanumeric() || c.is_whitespace() || matches!(c, '-' | '_' | '.' | '+')
}

/// The string a search client signs.
pub fn signing_payload(path: &str, query: &str, timestamp: &str) -> String {
    format!("{path}|{query}|{timestamp}")
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
