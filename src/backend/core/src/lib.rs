#![allow(clippy::result_large_err)]
//! # Roastify Core
//!
//! Request shaping for the Roastify listening-stats server.
//!
//! ## Architecture
//!
//! - **Counter Store**: fixed-window request counts shared by every limiter
//! - **Rate Limiting**: per-client limits for general API, AI and provider routes, plus a global upstream quota
//! - **Response Cache**: short-lived JSON cache with bulk eviction by insertion order
//! - **Retry**: exponential backoff around upstream generation, quota errors only
//! - **Fallback**: canned content when generation is unavailable, never cached
//! - **Pipeline**: cache → limiter → quota → retry → fallback for each AI feature
//! - **Telemetry**: structured logging and Prometheus metrics

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fallback;
pub mod limits;
pub mod middleware;
pub mod pipeline;
pub mod retry;
pub mod sweeper;
pub mod telemetry;
pub mod upstream;

pub use error::{AppError, ErrorCode, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::{build_router, AppState};
    pub use crate::cache::{CacheConfig, CacheKey, CacheStats, ResponseCache, ResponseCacheLayer};
    pub use crate::clock::{Clock, ManualClock, SharedClock, SystemClock};
    pub use crate::config::Config;
    pub use crate::error::{AppError, ErrorCode, ErrorSeverity, Result};
    pub use crate::fallback::{FallbackCatalog, Feature};
    pub use crate::limits::{
        CounterDecision, CounterStore, RateLimitConfig, RateLimitResult, RateLimiter,
        UpstreamQuota,
    };
    pub use crate::middleware::RateLimitLayer;
    pub use crate::pipeline::{FeatureRequest, FeatureResponse, ListeningSummary, Pipeline};
    pub use crate::retry::{retry, RetryOutcome, RetryPolicy, Retryable};
    pub use crate::sweeper::Sweeper;
    pub use crate::upstream::{TextGenerator, UpstreamError, UpstreamErrorKind};
}
