// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Signed webhook cache invalidation.
//!
//! GitHub signs deliveries with `X-Hub-Signature-256: sha256=<hex hmac>` over
//! the raw body. A valid delivery purges every cached response from every
//! configured backend; there is no per-discussion invalidation.

use crate::cache::ResponseCache;
use crate::error::ProxyError;
use crate::key::CACHE_KEY_PREFIX;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const EVENT_HEADER: &str = "x-github-event";

const SIGNATURE_PREFIX: &str = "sha256=";

pub struct WebhookInvalidator {
    secret: Option<String>,
    targets: Vec<Arc<dyn ResponseCache>>,
}

impl WebhookInvalidator {
    /// `targets` are all caches that may hold entries, active or not.
    pub fn new(secret: Option<String>, targets: Vec<Arc<dyn ResponseCache>>) -> Self {
        Self { secret, targets }
    }

    /// Verify a delivery and purge the caches. Returns the number of entries removed.
    pub async fn handle(&self, body: &[u8], signature: Option<&str>) -> Result<usize, ProxyError> {
        self.verify(body, signature)?;

        let mut removed = 0;
        for target in &self.targets {
            match target.invalidate(CACHE_KEY_PREFIX).await {
                Ok(n) => removed += n,
                Err(e) => {
                    warn!(backend = target.name(), error = %e, "Cache invalidation failed");
                }
            }
        }
        info!(removed, "Webhook invalidated cache");
        Ok(removed)
    }

    /// Check `signature` against the HMAC of `body`.
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), ProxyError> {
        let Some(secret) = self.secret.as_deref() else {
            return Err(ProxyError::Forbidden(
                "Webhook secret is not configured".to_string(),
            ));
        };

        let signature =
            signature.ok_or_else(|| ProxyError::Unauthorized("Missing webhook signature".into()))?;
        let provided = signature
            .trim()
            .strip_prefix(SIGNATURE_PREFIX)
            .and_then(|hex_sig| hex::decode(hex_sig).ok())
            .ok_or_else(|| ProxyError::Unauthorized("Malformed webhook signature".into()))?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| ProxyError::internal("HMAC rejected webhook secret"))?;
        mac.update(body);
        mac.verify_slice(&provided).map_err(|_| {
            warn!(body_len = body.len(), "Webhook signature mismatch, possible tampering");
            ProxyError::Unauthorized("Invalid webhook signature".into())
        })
    }
}

/// `sha256=<hex>` signature for `body`, as GitHub sends it.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}
