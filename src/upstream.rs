// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! GitHub Discussions API client.
//!
//! One HTTP round trip per call, a fixed 20 second timeout and no retries.
//! Every failure is folded into [`UpstreamError`], which callers always
//! report as a bad gateway.

use crate::config::UpstreamConfig;
use crate::validator::{DiscussionQuery, RequestKind};
use reqwest::{RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(20);

const PAGE_SIZE: u32 = 10;
const SEARCH_PAGE_SIZE: u32 = 30;
const USER_AGENT: &str = concat!("discussion-proxy/", env!("CARGO_PKG_VERSION"));

/// Discussions query. Request values only ever travel as variables.
const DISCUSSIONS_QUERY: &str = r#"
query Discussions($owner: String!, $name: String!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    discussions(first: $first, after: $after, orderBy: {field: UPDATED_AT, direction: DESC}) {
      totalCount
      pageInfo { hasNextPage endCursor }
      nodes {
        id
        number
        title
        url
        body
        createdAt
        updatedAt
        author { login avatarUrl url }
        category { name emoji }
        labels(first: 10) { nodes { name color } }
        reactions(first: 20) { totalCount nodes { content user { login } } }
        comments(first: 20) {
          totalCount
          nodes {
            id
            body
            url
            createdAt
            author { login avatarUrl url }
            reactions(first: 10) { totalCount nodes { content } }
            replies(first: 5) {
              totalCount
              nodes { id body createdAt author { login avatarUrl url } }
            }
          }
        }
      }
    }
  }
}
"#;

/// Upstream failure, as reported to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Upstream request failed: {0}")]
    Transport(String),

    #[error("Upstream authentication failed")]
    Unauthorized,

    #[error("Upstream access forbidden or rate limited")]
    Forbidden,

    #[error("Upstream rate limit exceeded")]
    RateLimited,

    #[error("Upstream returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Upstream query failed: {0}")]
    Application(String),
}

impl UpstreamError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Unauthorized | Self::Forbidden | Self::RateLimited | Self::Status { .. } => {
                "status"
            }
            Self::Application(_) => "application",
        }
    }
}

/// Payload on success: the GraphQL `data` object or the REST/search JSON.
pub type UpstreamResult = Result<Value, UpstreamError>;

/// GitHub API client.
pub struct UpstreamClient {
    config: UpstreamConfig,
    client: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { config, client })
    }

    /// Whether an API credential is available.
    pub fn is_configured(&self) -> bool {
        self.config.token.is_some()
    }

    pub async fn call(&self, query: &DiscussionQuery) -> UpstreamResult {
        debug!(kind = %query.kind, cursor = ?query.cursor, "Calling upstream");
        match query.kind {
            RequestKind::Graphql => self.graphql(query.cursor.as_deref()).await,
            RequestKind::Rest => self.rest().await,
            RequestKind::Search => self.search(query.query.as_deref().unwrap_or_default()).await,
        }
    }

    async fn graphql(&self, cursor: Option<&str>) -> UpstreamResult {
        let body = json!({
            "query": DISCUSSIONS_QUERY,
            "variables": {
                "owner": self.config.owner,
                "name": self.config.repo,
                "first": PAGE_SIZE,
                "after": cursor,
            },
        });
        let request = self.client.post(self.endpoint("/graphql")?).json(&body);
        let mut payload = self.send(request).await?;

        if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let message = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .next()
                    .unwrap_or("unknown GraphQL error")
                    .to_string();
                warn!(error = %message, count = errors.len(), "Upstream GraphQL errors");
                return Err(UpstreamError::Application(message));
            }
        }

        match payload.get_mut("data") {
            Some(data) if !data.is_null() => Ok(data.take()),
            _ => Err(UpstreamError::Application(
                "response contained no data".to_string(),
            )),
        }
    }

    async fn rest(&self) -> UpstreamResult {
        let mut url = self.endpoint(&format!(
            "/repos/{}/{}/discussions",
            self.config.owner, self.config.repo
        ))?;
        url.query_pairs_mut()
            .append_pair("per_page", &PAGE_SIZE.to_string());
        self.send(self.client.get(url)).await
    }

    async fn search(&self, terms: &str) -> UpstreamResult {
        let q = format!(
            "repo:{}/{} type:discussions {}",
            self.config.owner, self.config.repo, terms
        );
        let mut url = self.endpoint("/search/issues")?;
        url.query_pairs_mut()
            .append_pair("q", &q)
            .append_pair("per_page", &SEARCH_PAGE_SIZE.to_string());
        self.send(self.client.get(url)).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, UpstreamError> {
        let base = self.config.api_url.trim_end_matches('/');
        Url::parse(&format!("{base}{path}")).map_err(|e| {
            warn!(api_url = %self.config.api_url, error = %e, "Invalid upstream URL");
            UpstreamError::Transport("invalid upstream URL".to_string())
        })
    }

    async fn send(&self, request: RequestBuilder) -> UpstreamResult {
        let mut request = request.header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = self.config.token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            warn!(error = %e, timeout = e.is_timeout(), "Upstream unreachable");
            if e.is_timeout() {
                UpstreamError::Transport("upstream timed out".to_string())
            } else {
                UpstreamError::Transport("could not reach upstream".to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_string));
            warn!(status = status.as_u16(), message = ?message, "Upstream returned error status");
            return Err(map_status(status, message));
        }

        response.json::<Value>().await.map_err(|e| {
            warn!(error = %e, "Upstream body was not valid JSON");
            UpstreamError::Transport("invalid upstream response".to_string())
        })
    }
}

/// Map a non-success upstream status to a caller-facing error.
fn map_status(status: StatusCode, message: Option<String>) -> UpstreamError {
    match status {
        StatusCode::UNAUTHORIZED => UpstreamError::Unauthorized,
        StatusCode::FORBIDDEN => UpstreamError::Forbidden,
        StatusCode::TOO_MANY_REQUESTS => UpstreamError::RateLimited,
        _ => UpstreamError::Status {
            status: status.as_u16(),
            message: message.unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string()
            }),
        },
    }
}
