//! Error handling for Roastify Core.
//!
//! This module provides:
//! - A small, stable error taxonomy (`ErrorCode`) for the request-shaping layer
//! - HTTP status code mapping for API responses
//! - User-facing messages kept separate from internal detail
//! - Severity-aware logging through `tracing`
//! - An error counter through `metrics`
//!
//! Only [`ErrorCode::RateLimited`] is ever surfaced to AI-feature callers as a
//! hard failure; the pipeline absorbs every other code into a fallback.
//!
//! # Usage
//!
//! ```rust,ignore
//! use roastify_core::error::{AppError, ErrorCode, Result};
//!
//! fn check() -> Result<()> {
//!     Err(AppError::rate_limited("Too many requests. Please slow down.", 42))
//! }
//! ```

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Roastify operations.
pub type Result<T> = std::result::Result<T, AppError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Request shaping
    /// The caller exhausted its rate-limit window.
    RateLimited,
    /// The global upstream budget is exhausted.
    QuotaExceeded,

    // Upstream
    /// Credential missing/invalid or a non-transient upstream failure.
    UpstreamUnavailable,
    /// The upstream answered with something that could not be parsed.
    MalformedUpstreamResult,
    /// The music provider rejected the caller's credential.
    Unauthorized,

    // Request
    /// The request payload failed validation.
    ValidationError,
    /// A cache-clear pattern did not compile.
    InvalidPattern,

    // Internal
    /// Configuration could not be loaded.
    ConfigurationError,
    /// Anything else.
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::RateLimited | Self::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::MalformedUpstreamResult => StatusCode::BAD_GATEWAY,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidPattern => StatusCode::BAD_REQUEST,
            Self::ConfigurationError | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the condition clears by itself if the caller waits.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::QuotaExceeded)
    }

    /// Whether an AI-feature route should answer with a canned fallback
    /// instead of failing.
    pub const fn is_substitutable(&self) -> bool {
        matches!(
            self,
            Self::QuotaExceeded | Self::UpstreamUnavailable | Self::MalformedUpstreamResult
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller mistakes and expected throttling
    Low,
    /// Upstream trouble the product can absorb
    Medium,
    /// Things an operator must look at
    High,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::RateLimited
            | ErrorCode::ValidationError
            | ErrorCode::InvalidPattern
            | ErrorCode::Unauthorized => Self::Low,

            ErrorCode::QuotaExceeded
            | ErrorCode::UpstreamUnavailable
            | ErrorCode::MalformedUpstreamResult => Self::Medium,

            ErrorCode::ConfigurationError | ErrorCode::InternalError => Self::High,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Roastify Core.
#[derive(Error, Debug)]
pub struct AppError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to expose to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Seconds the caller should wait before retrying
    retry_after_secs: Option<u64>,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl AppError {
    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            retry_after_secs: None,
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    /// Create a rate-limited error carrying the retry delay.
    pub fn rate_limited(message: impl Into<Cow<'static, str>>, retry_after_secs: u64) -> Self {
        Self::new(ErrorCode::RateLimited, message).with_retry_after(retry_after_secs)
    }

    /// Create a global-quota error.
    pub fn quota_exceeded(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::QuotaExceeded, message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Attach a retry delay in seconds.
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_secs = Some(seconds);
        self
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-friendly message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the retry delay (if any).
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after_secs
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let status = self.http_status().as_u16();

        match self.severity() {
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    source = ?self.source,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "Upstream error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    http_status = status,
                    user_message = %self.user_message,
                    "Request rejected"
                );
            }
        }
    }

    fn record_metrics(&self) {
        counter!(
            "roastify_errors_total",
            "code" => self.code.to_string(),
            "retryable" => self.code.is_retryable().to_string(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error body returned to API clients.
///
/// The 429 shape is `{ "success": false, "error": "...", "retryAfter": 12 }`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Always false for errors
    pub success: bool,

    /// User-friendly error message
    pub error: String,

    /// Machine-readable error code
    pub code: ErrorCode,

    /// Seconds to wait before retrying
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        Self {
            success: false,
            error: error.user_message.to_string(),
            code: error.code,
            retry_after: error.retry_after_secs,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.http_status();
        let body = ErrorResponse::from(&self);
        let mut response = (status, Json(body)).into_response();

        if let Some(secs) = self.retry_after_secs {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations
// ═══════════════════════════════════════════════════════════════════════════════

impl From<regex::Error> for AppError {
    fn from(error: regex::Error) -> Self {
        Self::with_internal(ErrorCode::InvalidPattern, "Invalid cache pattern", error.to_string())
            .with_source(error)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Failed to load configuration",
            error.to_string(),
        )
        .with_source(error)
    }
}
