//! HTTP caching middleware for GET routes.
//!
//! On a hit the stored JSON is returned directly with `X-Cache: HIT` and the
//! wrapped service is never called. On a miss the wrapped service runs; a 2xx
//! JSON body is parsed and stored, and the response is marked `X-Cache: MISS`.
//! Other methods pass straight through.

use super::{CacheKey, ResponseCache};
use crate::error::AppError;
use axum::{
    body::Body,
    extract::{OriginalUri, Request},
    http::{header, HeaderValue, Method},
    response::{IntoResponse, Response},
    Json,
};
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};
use tracing::{debug, warn};

/// Response header carrying `HIT` or `MISS`.
pub const CACHE_HEADER: &str = "X-Cache";

/// Upper bound on a buffered response body.
const MAX_CACHED_BODY: usize = 2 * 1024 * 1024;

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer
// ═══════════════════════════════════════════════════════════════════════════════

/// Caching layer for Tower.
#[derive(Clone)]
pub struct ResponseCacheLayer {
    cache: Arc<ResponseCache>,
    ttl: Duration,
}

impl ResponseCacheLayer {
    /// Cache with the store's default TTL.
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        let ttl = cache.config().default_ttl();
        Self { cache, ttl }
    }

    /// Override the TTL for routes under this layer.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

impl<S> Layer<S> for ResponseCacheLayer {
    type Service = ResponseCacheService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ResponseCacheService {
            inner,
            cache: self.cache.clone(),
            ttl: self.ttl,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Caching service.
#[derive(Clone)]
pub struct ResponseCacheService<S> {
    inner: S,
    cache: Arc<ResponseCache>,
    ttl: Duration,
}

impl<S> Service<Request<Body>> for ResponseCacheService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let cache = self.cache.clone();
        let ttl = self.ttl;
        let mut inner = self.inner.clone();

        if request.method() != Method::GET {
            return Box::pin(async move { inner.call(request).await });
        }

        // Nested routers see a stripped URI; key on the one the client sent.
        let uri = request
            .extensions()
            .get::<OriginalUri>()
            .map(|original| original.0.clone())
            .unwrap_or_else(|| request.uri().clone());
        let key = CacheKey::from_request(request.method(), &uri, request.headers()).build();

        Box::pin(async move {
            if let Some(payload) = cache.get(&key) {
                debug!(key = %key, "Cache hit");
                return Ok(with_marker(Json(payload).into_response(), "HIT"));
            }

            let response = inner.call(request).await?;

            if !response.status().is_success() || !is_json(&response) {
                return Ok(with_marker(response, "MISS"));
            }

            let (parts, body) = response.into_parts();
            let bytes = match axum::body::to_bytes(body, MAX_CACHED_BODY).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to buffer response for caching");
                    return Ok(AppError::internal(format!("response body: {e}")).into_response());
                }
            };

            match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => cache.set(key, value, ttl),
                Err(e) => debug!(key = %key, error = %e, "Response body is not JSON, not caching"),
            }

            let response = Response::from_parts(parts, Body::from(bytes));
            Ok(with_marker(response, "MISS"))
        })
    }
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

fn with_marker(mut response: Response, marker: &'static str) -> Response {
    response
        .headers_mut()
        .insert(CACHE_HEADER, HeaderValue::from_static(marker));
    response
}
