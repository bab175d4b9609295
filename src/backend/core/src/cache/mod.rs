//! Short-lived response cache.
//!
//! This module provides:
//!
//! - **Store**: process-local map with per-entry TTL and bulk eviction by insertion order
//! - **Keys**: `METHOD:path?query:credential` keys that never collide across callers
//! - **HTTP Middleware**: `X-Cache: HIT|MISS` for GET routes, 2xx JSON only
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Response Cache                        │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐           ┌──────────────────────────┐  │
//! │  │  CacheKey   │           │  ResponseCacheLayer      │  │
//! │  │ (key.rs)    │──────────▶│  (GET routes, X-Cache)   │  │
//! │  └─────────────┘           └────────────┬─────────────┘  │
//! │                                         ▼                │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │  ResponseCache: HashMap + VecDeque insertion order │  │
//! │  └────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use roastify_core::cache::{CacheConfig, ResponseCache, ResponseCacheLayer};
//!
//! let cache = Arc::new(ResponseCache::new(CacheConfig::default()));
//!
//! let app = Router::new()
//!     .route("/api/spotify/me", get(me))
//!     .layer(ResponseCacheLayer::new(cache.clone()));
//!
//! cache.clear(Some("^GET:/api/spotify/top"))?;
//! ```

pub mod key;
pub mod middleware;
pub mod store;

pub use key::{bearer_token, CacheKey, ANONYMOUS, CREDENTIAL_PREFIX_LEN};
pub use middleware::{ResponseCacheLayer, ResponseCacheService, CACHE_HEADER};
pub use store::{CacheEntry, CacheStats, ResponseCache};

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Cache Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Main cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default TTL for cache entries, in milliseconds
    pub default_ttl_ms: u64,

    /// Entry ceiling before bulk eviction kicks in
    pub max_entries: usize,

    /// Period of the expiry sweep, in milliseconds
    pub sweep_interval_ms: u64,

    /// Entries evicted at once when the ceiling is reached
    pub eviction_batch: usize,

    /// TTL for generated AI responses; the default TTL when unset
    #[serde(default)]
    pub ai_ttl_ms: Option<u64>,

    /// TTL for relayed provider responses; the default TTL when unset
    #[serde(default)]
    pub provider_ttl_ms: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 5 * 60 * 1000,
            max_entries: 1_000,
            sweep_interval_ms: 60 * 1000,
            eviction_batch: 100,
            ai_ttl_ms: None,
            provider_ttl_ms: None,
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration builder.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn ai_ttl(&self) -> Duration {
        self.ai_ttl_ms.map_or_else(|| self.default_ttl(), Duration::from_millis)
    }

    pub fn provider_ttl(&self) -> Duration {
        self.provider_ttl_ms.map_or_else(|| self.default_ttl(), Duration::from_millis)
    }
}

/// Builder for cache configuration.
#[derive(Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.config.default_ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn max_entries(mut self, max: usize) -> Self {
        self.config.max_entries = max;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn eviction_batch(mut self, batch: usize) -> Self {
        self.config.eviction_batch = batch;
        self
    }

    pub fn ai_ttl(mut self, ttl: Duration) -> Self {
        self.config.ai_ttl_ms = Some(ttl.as_millis() as u64);
        self
    }

    pub fn provider_ttl(mut self, ttl: Duration) -> Self {
        self.config.provider_ttl_ms = Some(ttl.as_millis() as u64);
        self
    }

    pub fn build(self) -> CacheConfig {
        self.config
    }
}
