//! Rate limiting middleware.
//!
//! Features:
//! - Fixed-window counting over the shared [`CounterStore`](crate::limits::CounterStore)
//! - Per-client limits keyed by network identity and route scope
//! - Standard X-RateLimit headers on every admitted response
//! - `429` with `Retry-After` and a JSON body on rejection
//!
//! # Example
//!
//! ```rust,ignore
//! use roastify_core::limits::{CounterStore, RateLimitConfig, RateLimiter};
//! use roastify_core::middleware::RateLimitLayer;
//!
//! let store = Arc::new(CounterStore::new());
//! let limiter = RateLimiter::new(RateLimiter::API, RateLimitConfig::general_api(), store);
//!
//! let app = Router::new()
//!     .route("/api/ai/roast", post(roast))
//!     .layer(RateLimitLayer::new(Arc::new(limiter), "/api/ai"));
//! ```

use crate::error::AppError;
use crate::limits::{RateLimitResult, RateLimiter};
use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::{
    net::SocketAddr,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};

const LIMIT_HEADER: &str = "X-RateLimit-Limit";

/// Identity used when neither a forwarded address nor a socket address is known.
pub const UNKNOWN_CLIENT: &str = "unknown";

// ═══════════════════════════════════════════════════════════════════════════════
// Client Identity
// ═══════════════════════════════════════════════════════════════════════════════

/// Caller identity: first non-empty `X-Forwarded-For` entry, else the socket
/// address, else `unknown`.
pub fn extract_client_identity(headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').map(str::trim).find(|part| !part.is_empty()));

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    remote_addr
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Identity of the caller of an axum request.
pub fn request_identity<B>(request: &Request<B>) -> String {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    extract_client_identity(request.headers(), remote_addr)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Headers
// ═══════════════════════════════════════════════════════════════════════════════

/// Write the `X-RateLimit-*` headers for a check result.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    let pairs = [
        (LIMIT_HEADER, result.limit.to_string()),
        ("X-RateLimit-Remaining", result.remaining.to_string()),
        ("X-RateLimit-Reset", result.reset_at.timestamp().to_string()),
    ];

    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

/// The 429 response for a rejected check.
pub fn rejection_response(result: &RateLimitResult) -> Response {
    rejection_with_message(result, "Too many requests. Please slow down.")
}

/// The 429 response for a rejected check, with a route-specific message.
pub fn rejection_with_message(result: &RateLimitResult, message: &'static str) -> Response {
    let retry_after = result.retry_after_secs.unwrap_or(1);
    let mut response = AppError::rate_limited(message, retry_after).into_response();
    apply_rate_limit_headers(response.headers_mut(), result);
    response
}

fn has_rate_limit_headers(headers: &HeaderMap) -> bool {
    headers.contains_key(LIMIT_HEADER)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer and Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Rate limiting layer for Tower.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
    scope: Arc<str>,
}

impl RateLimitLayer {
    /// Create a rate limit layer counting every request under `scope`.
    pub fn new(limiter: Arc<RateLimiter>, scope: impl Into<Arc<str>>) -> Self {
        Self {
            limiter,
            scope: scope.into(),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
            scope: self.scope.clone(),
        }
    }
}

/// Rate limiting service.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
    scope: Arc<str>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let limiter = self.limiter.clone();
        let scope = self.scope.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let identity = request_identity(&request);
            let result = limiter.check(&identity, &scope);

            if !result.allowed {
                return Ok(rejection_response(&result));
            }

            let mut response = inner.call(request).await?;
            // A limiter further in decided this request; its headers stand.
            if !has_rate_limit_headers(response.headers()) {
                apply_rate_limit_headers(response.headers_mut(), &result);
            }
            Ok(response)
        })
    }
}
