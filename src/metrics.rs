// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus counters for the proxy.
//!
//! The registry belongs to the application state rather than a global, so
//! tests can build independent instances.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    cache: IntCounterVec,
    rate_limited: IntCounter,
    upstream_failures: IntCounterVec,
    webhook_invalidations: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("proxy_requests_total", "Requests by outcome"),
            &["outcome"],
        )?;
        let cache = IntCounterVec::new(
            Opts::new("proxy_cache_total", "Cache lookups by result"),
            &["result"],
        )?;
        let rate_limited = IntCounter::new("proxy_rate_limited_total", "Requests denied by the rate limiter")?;
        let upstream_failures = IntCounterVec::new(
            Opts::new("proxy_upstream_failures_total", "Failed upstream calls by kind"),
            &["kind"],
        )?;
        let webhook_invalidations = IntCounter::new(
            "proxy_webhook_invalidations_total",
            "Accepted webhook invalidations",
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(cache.clone()))?;
        registry.register(Box::new(rate_limited.clone()))?;
        registry.register(Box::new(upstream_failures.clone()))?;
        registry.register(Box::new(webhook_invalidations.clone()))?;

        Ok(Self {
            registry,
            requests,
            cache,
            rate_limited,
            upstream_failures,
            webhook_invalidations,
        })
    }

    pub fn record_request(&self, outcome: &str) {
        self.requests.with_label_values(&[outcome]).inc();
    }

    /// `result` is one of `hit`, `miss`, `error`.
    pub fn record_cache(&self, result: &str) {
        self.cache.with_label_values(&[result]).inc();
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.inc();
    }

    pub fn record_upstream_failure(&self, kind: &str) {
        self.upstream_failures.with_label_values(&[kind]).inc();
    }

    pub fn record_webhook_invalidation(&self) {
        self.webhook_invalidations.inc();
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.record_cache("hit");
        metrics.record_cache("miss");
        metrics.record_rate_limited();
        metrics.record_upstream_failure("transport");

        let text = metrics.render().unwrap();
        assert!(text.contains("proxy_cache_total{result=\"hit\"} 1"));
        assert!(text.contains("proxy_rate_limited_total 1"));
        assert!(text.contains("proxy_upstream_failures_total{kind=\"transport\"} 1"));
    }
}
