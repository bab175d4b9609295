//! HTTP surface.
//!
//! # Routes
//!
//! - `GET /health`, `GET /metrics`
//! - `POST /api/ai/{roast,personality,story}`: general API limiter, then the
//!   shaping pipeline (cache, AI limiter, quota, retry, fallback)
//! - `GET /api/spotify/me`, `GET /api/spotify/top/{artists|tracks}`: response
//!   cache in front of the provider limiter
//! - `DELETE /api/cache?pattern=`: pattern-based cache clear

mod handlers;

use crate::cache::{ResponseCache, ResponseCacheLayer};
use crate::clock::{SharedClock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::limits::{CounterStore, RateLimiter, UpstreamQuota};
use crate::middleware::RateLimitLayer;
use crate::pipeline::{Pipeline, AI_SCOPE};
use crate::sweeper::Sweeper;
use crate::telemetry::MetricsRegistry;
use crate::upstream::{GeminiClient, SpotifyClient, TextGenerator};
use axum::{
    http::HeaderValue,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Scope the provider limiter counts under.
pub const PROVIDER_SCOPE: &str = "/api/spotify";

/// Scope for the cache admin route.
pub const CACHE_SCOPE: &str = "/api/cache";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub cache: Arc<ResponseCache>,
    pub counters: Arc<CounterStore>,
    pub api_limiter: Arc<RateLimiter>,
    pub provider_limiter: Arc<RateLimiter>,
    pub spotify: Arc<SpotifyClient>,
    pub metrics: MetricsRegistry,
    pub cors_origins: Vec<String>,
}

impl AppState {
    /// Build every service from configuration, using Gemini when a key is set.
    pub fn from_config(config: &Config, metrics: MetricsRegistry) -> Result<Self> {
        let generator = GeminiClient::from_config(&config.upstream)?
            .map(|client| Arc::new(client) as Arc<dyn TextGenerator>);

        if generator.is_none() {
            warn!("No upstream API key configured, AI routes will serve fallbacks");
        }

        Self::with_parts(config, generator, SystemClock::shared(), metrics)
    }

    /// Build with an explicit generator and clock.
    pub fn with_parts(
        config: &Config,
        generator: Option<Arc<dyn TextGenerator>>,
        clock: SharedClock,
        metrics: MetricsRegistry,
    ) -> Result<Self> {
        let counters = Arc::new(CounterStore::with_clock(clock.clone()));
        let cache = Arc::new(ResponseCache::with_clock(config.cache.clone(), clock));

        let limiter = |namespace, limit: &crate::limits::RateLimitConfig| {
            Arc::new(RateLimiter::new(namespace, limit.clone(), counters.clone()))
        };
        let api_limiter = limiter(RateLimiter::API, &config.limits.api);
        let ai_limiter = limiter(RateLimiter::AI, &config.limits.ai);
        let provider_limiter = limiter(RateLimiter::PROVIDER, &config.limits.provider);

        let quota = UpstreamQuota::new(config.limits.upstream_quota_per_minute, counters.clone());
        let pipeline = Pipeline::new(
            cache.clone(),
            ai_limiter,
            quota,
            generator,
            config.retry.clone(),
        )
        .with_cache_ttl(config.cache.ai_ttl())
        .with_catalog(config.fallbacks.catalog());

        Ok(Self {
            pipeline: Arc::new(pipeline),
            cache,
            counters,
            api_limiter,
            provider_limiter,
            spotify: Arc::new(SpotifyClient::new(&config.spotify)?),
            metrics,
            cors_origins: config.server.cors_origins.clone(),
        })
    }

    /// Start the counter and cache sweeps. Needs a tokio runtime.
    pub fn start_sweepers(&self, config: &Config) -> Sweeper {
        let mut sweeper = Sweeper::new();
        sweeper.spawn(
            "counters",
            self.counters.clone(),
            config.limits.counter_sweep_interval(),
        );
        sweeper.spawn("cache", self.cache.clone(), config.cache.sweep_interval());
        info!(tasks = sweeper.len(), "Sweepers started");
        sweeper
    }
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    let ai_routes = Router::new()
        .route("/roast", post(handlers::roast))
        .route("/personality", post(handlers::personality))
        .route("/story", post(handlers::story))
        .layer(RateLimitLayer::new(state.api_limiter.clone(), AI_SCOPE));

    let spotify_routes = Router::new()
        .route("/me", get(handlers::spotify_me))
        .route("/top/:kind", get(handlers::spotify_top))
        .layer(RateLimitLayer::new(state.provider_limiter.clone(), PROVIDER_SCOPE))
        .layer(
            ResponseCacheLayer::new(state.cache.clone())
                .with_ttl(state.cache.config().provider_ttl()),
        );

    let cache_routes = Router::new()
        .route("/", delete(handlers::clear_cache))
        .layer(RateLimitLayer::new(state.api_limiter.clone(), CACHE_SCOPE));

    let cors = cors_layer(&state.cors_origins);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .nest(AI_SCOPE, ai_routes)
        .nest(PROVIDER_SCOPE, spotify_routes)
        .nest(CACHE_SCOPE, cache_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
