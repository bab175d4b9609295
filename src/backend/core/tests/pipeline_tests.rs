//! End-to-end tests for the AI feature routes.
//!
//! Requests go through the full router with an in-process text generator,
//! covering:
//! - Fallback substitution when no generator is configured
//! - Per-client AI limiter rejections
//! - Caching of generated responses
//! - Quota exhaustion and malformed output falling back
//! - Request validation and the cache admin route

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use roastify_core::api::{build_router, AppState};
use roastify_core::cache::CACHE_HEADER;
use roastify_core::clock::ManualClock;
use roastify_core::config::Config;
use roastify_core::fallback::{FallbackCatalog, Feature};
use roastify_core::retry::RetryPolicy;
use roastify_core::telemetry::MetricsRegistry;
use roastify_core::upstream::{TextGenerator, UpstreamError};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

// ============================================================================
// Fixtures
// ============================================================================

/// Replays scripted answers; repeats the last one once the script runs out.
struct ScriptedGenerator {
    answers: Mutex<VecDeque<Result<String, UpstreamError>>>,
    last: fn() -> Result<String, UpstreamError>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn always(last: fn() -> Result<String, UpstreamError>) -> Arc<Self> {
        Self::scripted(Vec::new(), last)
    }

    fn scripted(
        answers: Vec<Result<String, UpstreamError>>,
        last: fn() -> Result<String, UpstreamError>,
    ) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            last,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.answers.lock().unwrap().pop_front();
        next.unwrap_or_else(|| (self.last)())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.retry = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));
    config
}

fn app(config: &Config, generator: Option<Arc<dyn TextGenerator>>) -> (Router, AppState) {
    app_on_clock(config, generator, ManualClock::starting_now())
}

fn app_on_clock(
    config: &Config,
    generator: Option<Arc<dyn TextGenerator>>,
    clock: Arc<ManualClock>,
) -> (Router, AppState) {
    let state =
        AppState::with_parts(config, generator, clock, MetricsRegistry::disabled()).unwrap();
    (build_router(state.clone()), state)
}

fn generated_roast() -> Result<String, UpstreamError> {
    Ok("You listen to sad songs in major keys.".to_string())
}

fn summary() -> Value {
    json!({
        "topArtists": ["Radiohead", "Portishead"],
        "topTracks": ["Glory Box"],
        "topGenres": ["trip hop"],
        "timeRange": "short_term"
    })
}

fn feature_request(feature: &str, body: &Value, client: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/ai/{feature}"))
        .header("content-type", "application/json")
        .header("x-forwarded-for", client)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Fallback Substitution
// ============================================================================

#[tokio::test]
async fn test_unconfigured_upstream_serves_catalog_roast() {
    let (app, _state) = app(&test_config(), None);

    let response = app
        .oneshot(feature_request("roast", &summary(), "203.0.113.7"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CACHE_HEADER], "MISS");
    let body = read_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["fallback"], true);
    assert!(body["error"].is_string());

    let roast = body["roast"].as_str().unwrap();
    let catalog = FallbackCatalog::builtin();
    assert!(catalog.entries(Feature::Roast).iter().any(|e| e == roast));
}

#[tokio::test]
async fn test_configured_fallbacks_replace_builtin() {
    let mut config = test_config();
    config.fallbacks.story = vec!["Configured story.".to_string()];
    let (app, _state) = app(&config, None);

    let story = app
        .clone()
        .oneshot(feature_request("story", &summary(), "203.0.113.8"))
        .await
        .unwrap();
    assert_eq!(read_json(story).await["story"], "Configured story.");

    // Features left unconfigured keep the built-in payloads.
    let roast = app
        .oneshot(feature_request("roast", &summary(), "203.0.113.8"))
        .await
        .unwrap();
    let roast = read_json(roast).await;
    let catalog = FallbackCatalog::builtin();
    assert!(catalog
        .entries(Feature::Roast)
        .iter()
        .any(|e| e == roast["roast"].as_str().unwrap()));
}

#[tokio::test]
async fn test_fallbacks_are_not_cached() {
    let (app, state) = app(&test_config(), None);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(feature_request("story", &summary(), "203.0.113.7"))
            .await
            .unwrap();
        assert_eq!(response.headers()[CACHE_HEADER], "MISS");
    }
    assert!(state.cache.is_empty());
}

#[tokio::test]
async fn test_quota_exhaustion_falls_back_without_calling_upstream() {
    let mut config = test_config();
    config.limits.upstream_quota_per_minute = 1;
    let generator = ScriptedGenerator::always(|| Ok("A fine roast.".to_string()));
    let (app, _state) = app(&config, Some(generator.clone()));

    let first = app
        .clone()
        .oneshot(feature_request("roast", &summary(), "198.51.100.1"))
        .await
        .unwrap();
    assert_eq!(read_json(first).await["fallback"], false);

    // Different caller and body, so neither the cache nor the AI limiter applies.
    let other = json!({"topArtists": ["Aphex Twin"]});
    let second = app
        .oneshot(feature_request("roast", &other, "198.51.100.2"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let body = read_json(second).await;
    assert_eq!(body["fallback"], true);
    assert_eq!(body["error"], "AI service is busy, please try again shortly");
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_malformed_personality_falls_back() {
    let generator = ScriptedGenerator::always(|| Ok("I am not JSON at all".to_string()));
    let (app, state) = app(&test_config(), Some(generator.clone()));

    let response = app
        .oneshot(feature_request("personality", &summary(), "198.51.100.3"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["fallback"], true);
    let text = body["personality"].as_str().unwrap();
    assert!(FallbackCatalog::builtin()
        .entries(Feature::Personality)
        .iter()
        .any(|e| e == text));
    assert_eq!(generator.calls(), 1);
    assert!(state.cache.is_empty());
}

#[tokio::test]
async fn test_unavailable_upstream_is_not_retried() {
    let generator = ScriptedGenerator::always(|| Err(UpstreamError::unavailable("HTTP 503")));
    let (app, _state) = app(&test_config(), Some(generator.clone()));

    let response = app
        .oneshot(feature_request("story", &summary(), "198.51.100.4"))
        .await
        .unwrap();

    assert_eq!(read_json(response).await["fallback"], true);
    assert_eq!(generator.calls(), 1);
}

// ============================================================================
// Generation And Caching
// ============================================================================

#[tokio::test]
async fn test_generated_response_is_cached_per_body() {
    let generator = ScriptedGenerator::scripted(
        vec![Err(UpstreamError::quota("429 Too Many Requests"))],
        || Ok("```json\n{\"personality\": \"A moody night owl.\"}\n```".to_string()),
    );
    let (app, _state) = app(&test_config(), Some(generator.clone()));

    let first = app
        .clone()
        .oneshot(feature_request("personality", &summary(), "192.0.2.10"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()[CACHE_HEADER], "MISS");
    let first_body = read_json(first).await;
    assert_eq!(
        first_body,
        json!({"success": true, "personality": "A moody night owl.", "fallback": false})
    );
    // One quota failure, then success on the retry.
    assert_eq!(generator.calls(), 2);

    let second = app
        .clone()
        .oneshot(feature_request("personality", &summary(), "192.0.2.11"))
        .await
        .unwrap();
    assert_eq!(second.headers()[CACHE_HEADER], "HIT");
    assert_eq!(read_json(second).await, first_body);
    assert_eq!(generator.calls(), 2);

    let different = json!({"topGenres": ["shoegaze"]});
    let third = app
        .oneshot(feature_request("personality", &different, "192.0.2.10"))
        .await
        .unwrap();
    assert_eq!(third.headers()[CACHE_HEADER], "MISS");
    assert_eq!(generator.calls(), 3);
}

#[tokio::test]
async fn test_generated_response_uses_ai_ttl() {
    let mut config = test_config();
    config.cache.default_ttl_ms = 300_000;
    config.cache.ai_ttl_ms = Some(1_000);
    let generator = ScriptedGenerator::always(generated_roast);
    let clock = ManualClock::starting_now();
    let (app, _state) = app_on_clock(&config, Some(generator.clone()), clock.clone());

    let send = |app: Router| async move {
        app.oneshot(feature_request("roast", &summary(), "192.0.2.20"))
            .await
            .unwrap()
    };

    assert_eq!(send(app.clone()).await.headers()[CACHE_HEADER], "MISS");
    clock.advance_ms(999);
    assert_eq!(send(app.clone()).await.headers()[CACHE_HEADER], "HIT");
    clock.advance_ms(1);
    assert_eq!(send(app).await.headers()[CACHE_HEADER], "MISS");
    assert_eq!(generator.calls(), 2);
}

// ============================================================================
// Rate Limiting
// ============================================================================

#[tokio::test]
async fn test_ai_limiter_rejects_eleventh_request() {
    let (app, _state) = app(&test_config(), None);

    for n in 1..=10u64 {
        let response = app
            .clone()
            .oneshot(feature_request("roast", &summary(), "192.0.2.50"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "request {n}");
        // The AI limiter's headers replace the general API limiter's.
        assert_eq!(response.headers()["x-ratelimit-limit"], "10");
        assert_eq!(
            response.headers()["x-ratelimit-remaining"],
            (10 - n).to_string().as_str()
        );
    }

    let rejected = app
        .clone()
        .oneshot(feature_request("roast", &summary(), "192.0.2.50"))
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(rejected.headers().contains_key("retry-after"));
    assert_eq!(rejected.headers()["x-ratelimit-limit"], "10");
    assert_eq!(rejected.headers()["x-ratelimit-remaining"], "0");
    let body = read_json(rejected).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "RATE_LIMITED");
    assert!(body["retryAfter"].as_u64().unwrap() >= 1);

    // Another caller is unaffected.
    let other = app
        .oneshot(feature_request("roast", &summary(), "192.0.2.51"))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_ai_limit_is_shared_across_features() {
    let mut config = test_config();
    config.limits.ai.max_requests = 2;
    let (app, _state) = app(&config, None);

    for feature in ["roast", "story"] {
        let response = app
            .clone()
            .oneshot(feature_request(feature, &summary(), "192.0.2.60"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(feature_request("personality", &summary(), "192.0.2.60"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

// ============================================================================
// Validation And Admin
// ============================================================================

#[tokio::test]
async fn test_empty_summary_is_rejected() {
    let (app, _state) = app(&test_config(), None);

    let response = app
        .clone()
        .oneshot(feature_request("roast", &json!({"topArtists": []}), "192.0.2.70"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(read_json(response).await["code"], "VALIDATION_ERROR");

    let broken = Request::builder()
        .method("POST")
        .uri("/api/ai/roast")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(broken).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_clear_cache_route() {
    let (app, state) = app(&test_config(), None);
    state.cache.insert("GET:/api/spotify/me:anonymous", json!({"id": "a"}));
    state.cache.insert("GET:/api/spotify/top/artists:anonymous", json!([]));

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/cache?pattern=top")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({"success": true, "cleared": 1}));
    assert_eq!(state.cache.len(), 1);

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/cache?pattern=%28")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["code"], "INVALID_PATTERN");
}

#[tokio::test]
async fn test_health_reports_upstream_state() {
    let (app, _state) = app(&test_config(), None);

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["upstreamConfigured"], false);
}

#[tokio::test]
async fn test_health_reports_cache_hit_rate() {
    let generator = ScriptedGenerator::always(generated_roast);
    let (app, _state) = app(&test_config(), Some(generator));

    for _ in 0..2 {
        app.clone()
            .oneshot(feature_request("roast", &summary(), "192.0.2.30"))
            .await
            .unwrap();
    }

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let body = read_json(app.oneshot(request).await.unwrap()).await;
    assert_eq!(body["upstreamConfigured"], true);
    assert_eq!(body["cacheEntries"], 1);
    assert_eq!(body["cacheHitRate"], 0.5);
}
