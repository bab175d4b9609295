//! Per-client rate limiter over the shared counter store.

use super::store::CounterStore;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// One fixed-window limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,

    /// Window length in milliseconds
    pub window_ms: u64,

    /// Requests admitted per window
    pub max_requests: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::general_api()
    }
}

impl RateLimitConfig {
    /// General API routes: 15 requests per minute.
    pub fn general_api() -> Self {
        Self {
            enabled: true,
            window_ms: 60_000,
            max_requests: 15,
        }
    }

    /// AI-feature requests: 10 per minute.
    pub fn ai_feature() -> Self {
        Self {
            enabled: true,
            window_ms: 60_000,
            max_requests: 10,
        }
    }

    /// Music-provider relay: 30 per 30 seconds.
    pub fn provider() -> Self {
        Self {
            enabled: true,
            window_ms: 30_000,
            max_requests: 30,
        }
    }

    /// Create a builder.
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::default()
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Builder for rate limit configuration.
#[derive(Default)]
pub struct RateLimitConfigBuilder {
    config: RateLimitConfig,
}

impl RateLimitConfigBuilder {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.config.window_ms = window.as_millis() as u64;
        self
    }

    pub fn max_requests(mut self, max: u64) -> Self {
        self.config.max_requests = max;
        self
    }

    pub fn build(self) -> RateLimitConfig {
        self.config
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Limiter
// ═══════════════════════════════════════════════════════════════════════════════

/// Rate limit check result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,

    /// Current limit
    pub limit: u64,

    /// Remaining requests in window
    pub remaining: u64,

    /// When the limit resets
    pub reset_at: DateTime<Utc>,

    /// Seconds until retry is allowed (if rate limited)
    pub retry_after_secs: Option<u64>,
}

/// Named fixed-window limiter. Several limiters share one [`CounterStore`]
/// under distinct namespaces so exhausting one never touches another.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    namespace: &'static str,
    config: RateLimitConfig,
    store: Arc<CounterStore>,
}

impl RateLimiter {
    pub const API: &'static str = "api";
    pub const AI: &'static str = "ai";
    pub const PROVIDER: &'static str = "provider";

    /// Create a limiter.
    pub fn new(namespace: &'static str, config: RateLimitConfig, store: Arc<CounterStore>) -> Self {
        Self {
            namespace,
            config,
            store,
        }
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Counter key for a caller on a route scope.
    pub fn key(&self, identity: &str, scope: &str) -> String {
        format!("{}:{}:{}", self.namespace, identity, scope)
    }

    /// Count one request from `identity` against `scope`.
    pub fn check(&self, identity: &str, scope: &str) -> RateLimitResult {
        if !self.config.enabled {
            let window = ChronoDuration::milliseconds(self.config.window_ms as i64);
            return RateLimitResult {
                allowed: true,
                limit: self.config.max_requests,
                remaining: self.config.max_requests,
                reset_at: self.store.now() + window,
                retry_after_secs: None,
            };
        }

        let decision = self.store.check(
            &self.key(identity, scope),
            self.config.window(),
            self.config.max_requests,
        );

        counter!(
            "rate_limit_checks_total",
            "namespace" => self.namespace,
            "allowed" => decision.admitted.to_string(),
        )
        .increment(1);

        if !decision.admitted {
            counter!("rate_limit_rejected_total", "namespace" => self.namespace).increment(1);
            tracing::debug!(
                namespace = self.namespace,
                identity,
                scope,
                retry_after_secs = ?decision.retry_after_secs,
                "Rate limit exceeded"
            );
        }

        RateLimitResult {
            allowed: decision.admitted,
            limit: decision.limit,
            remaining: decision.remaining,
            reset_at: decision.reset_at,
            retry_after_secs: decision.retry_after_secs,
        }
    }
}
