//! REST API handlers.

use super::AppState;
use crate::cache::{bearer_token, CACHE_HEADER};
use crate::error::{AppError, ErrorCode, Result};
use crate::fallback::Feature;
use crate::middleware::rate_limit::{apply_rate_limit_headers, extract_client_identity};
use crate::pipeline::{FeatureRequest, ListeningSummary};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::net::SocketAddr;

// ═══════════════════════════════════════════════════════════════════════════════
// Health & Metrics
// ═══════════════════════════════════════════════════════════════════════════════

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "upstreamConfigured": state.pipeline.is_configured(),
        "cacheEntries": state.cache.len(),
        "cacheHitRate": state.cache.stats().hit_rate(),
    }))
}

/// Prometheus scrape endpoint.
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// AI Feature Handlers
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn roast(
    state: State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: std::result::Result<Json<ListeningSummary>, JsonRejection>,
) -> Result<Response> {
    run_feature(state, Feature::Roast, connect, headers, body).await
}

pub async fn personality(
    state: State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: std::result::Result<Json<ListeningSummary>, JsonRejection>,
) -> Result<Response> {
    run_feature(state, Feature::Personality, connect, headers, body).await
}

pub async fn story(
    state: State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: std::result::Result<Json<ListeningSummary>, JsonRejection>,
) -> Result<Response> {
    run_feature(state, Feature::Story, connect, headers, body).await
}

async fn run_feature(
    State(state): State<AppState>,
    feature: Feature,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: std::result::Result<Json<ListeningSummary>, JsonRejection>,
) -> Result<Response> {
    let Json(summary) = body.map_err(|e| AppError::validation(e.body_text()))?;
    summary.validate()?;

    let request = FeatureRequest {
        feature,
        identity: extract_client_identity(&headers, connect.map(|c| c.0)),
        bearer: bearer_token(&headers).map(str::to_string),
        summary,
    };

    let shaped = match state.pipeline.run(request).await {
        Ok(shaped) => shaped,
        Err(throttled) => return Ok(throttled.into_response()),
    };
    let mut response = Json(shaped.body).into_response();
    if let Some(limit) = &shaped.rate_limit {
        apply_rate_limit_headers(response.headers_mut(), limit);
    }
    let marker = if shaped.cache_hit { "HIT" } else { "MISS" };
    response
        .headers_mut()
        .insert(CACHE_HEADER, HeaderValue::from_static(marker));
    Ok(response)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Music Provider Relay
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct TopQuery {
    pub time_range: Option<String>,
    pub limit: Option<u32>,
}

const TIME_RANGES: [&str; 3] = ["short_term", "medium_term", "long_term"];

fn require_bearer(headers: &HeaderMap) -> Result<&str> {
    bearer_token(headers).ok_or_else(|| {
        AppError::new(ErrorCode::Unauthorized, "Missing music provider access token")
    })
}

/// The caller's provider profile.
pub async fn spotify_me(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    let token = require_bearer(&headers)?;
    let profile = state.spotify.get_json("me", &[], token).await?;
    Ok(Json(profile).into_response())
}

/// The caller's top artists or tracks.
pub async fn spotify_top(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<TopQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    if kind != "artists" && kind != "tracks" {
        return Err(AppError::validation("Top items must be 'artists' or 'tracks'"));
    }

    let time_range = query.time_range.unwrap_or_else(|| "medium_term".to_string());
    if !TIME_RANGES.contains(&time_range.as_str()) {
        return Err(AppError::validation(
            "time_range must be short_term, medium_term or long_term",
        ));
    }

    let limit = query.limit.unwrap_or(20);
    if !(1..=50).contains(&limit) {
        return Err(AppError::validation("limit must be between 1 and 50"));
    }

    let token = require_bearer(&headers)?;
    let items = state
        .spotify
        .get_json(
            &format!("me/top/{kind}"),
            &[("time_range", time_range), ("limit", limit.to_string())],
            token,
        )
        .await?;
    Ok(Json(items).into_response())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cache Admin
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    pub pattern: Option<String>,
}

/// Clear cache entries whose key matches `pattern`, or everything.
pub async fn clear_cache(
    State(state): State<AppState>,
    Query(query): Query<ClearQuery>,
) -> Result<impl IntoResponse> {
    let pattern = query.pattern.as_deref().filter(|p| !p.is_empty());
    let cleared = state.cache.clear(pattern)?;
    tracing::info!(cleared, pattern = ?pattern, "Cache cleared");

    Ok(Json(serde_json::json!({
        "success": true,
        "cleared": cleared,
    })))
}
