//! HTTP collaborators: the text-generation endpoint and the music provider.

pub mod gemini;
pub mod spotify;

pub use gemini::{GeminiClient, GeminiConfig};
pub use spotify::{SpotifyClient, SpotifyConfig};

use crate::error::{AppError, ErrorCode};
use crate::retry::Retryable;
use async_trait::async_trait;
use thiserror::Error;

/// Broad class of an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpstreamErrorKind {
    /// Rate or quota exhaustion; worth retrying after a pause.
    Quota,
    /// 5xx, timeout or connection failure. Served as a fallback on the
    /// first occurrence; only quota errors are retried.
    Unavailable,
    /// Rejected request (bad key, bad payload).
    Fatal,
    /// No credential configured.
    Unconfigured,
    /// Answer arrived but could not be parsed.
    Malformed,
}

/// Failure talking to an upstream service.
#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub message: String,
    /// Provider-supplied delay, when it sent one.
    pub retry_after_secs: Option<u64>,
}

impl UpstreamError {
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Quota, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Unavailable, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Fatal, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Malformed, message)
    }

    pub fn unconfigured() -> Self {
        Self::new(UpstreamErrorKind::Unconfigured, "upstream credential not configured")
    }

    pub fn with_retry_after(mut self, secs: Option<u64>) -> Self {
        self.retry_after_secs = secs;
        self
    }

    /// Map a reqwest transport failure.
    pub fn from_transport(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::unavailable(format!("timed out: {error}"))
        } else if error.is_connect() {
            Self::unavailable(format!("connection failed: {error}"))
        } else if error.is_decode() {
            Self::malformed(error.to_string())
        } else {
            Self::unavailable(error.to_string())
        }
    }
}

impl Retryable for UpstreamError {
    fn is_retryable(&self) -> bool {
        self.kind == UpstreamErrorKind::Quota
    }
}

impl From<UpstreamError> for AppError {
    fn from(error: UpstreamError) -> Self {
        let (code, user_message) = match error.kind {
            UpstreamErrorKind::Quota => (ErrorCode::QuotaExceeded, "Upstream quota exhausted"),
            UpstreamErrorKind::Malformed => {
                (ErrorCode::MalformedUpstreamResult, "Upstream returned an unreadable result")
            }
            UpstreamErrorKind::Unavailable
            | UpstreamErrorKind::Fatal
            | UpstreamErrorKind::Unconfigured => {
                (ErrorCode::UpstreamUnavailable, "Upstream service unavailable")
            }
        };
        let retry_after = error.retry_after_secs;
        let mut app = AppError::with_internal(code, user_message, error.message.clone());
        if let Some(secs) = retry_after {
            app = app.with_retry_after(secs);
        }
        app.with_source(error)
    }
}

/// Opaque text generation: prompt in, text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, UpstreamError>;

    /// Name used in logs.
    fn name(&self) -> &'static str;
}
