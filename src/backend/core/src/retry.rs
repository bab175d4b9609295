//! Retry with exponential backoff for single upstream calls.
//!
//! Only errors that report themselves as [`Retryable`] are retried; anything
//! else ends the run after one attempt.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Loose textual check for a quota signature (`429` or `quota`, any case).
///
/// Only for error bodies that carry no structured status.
pub fn classify_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("429") || lower.contains("quota")
}

// ═══════════════════════════════════════════════════════════════════════════════
// Policy
// ═══════════════════════════════════════════════════════════════════════════════

/// Backoff policy: `delay(n) = min(base * 2^(n-1), max)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first; zero behaves as one
    pub max_attempts: u32,

    /// Delay after the first failed attempt, in milliseconds
    pub base_delay_ms: u64,

    /// Ceiling on any single delay, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: base_delay.as_millis() as u64,
            max_delay_ms: max_delay.as_millis() as u64,
        }
    }

    /// Attempts actually made.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Outcome
// ═══════════════════════════════════════════════════════════════════════════════

/// How a retried operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    /// The operation produced a value.
    Success(T),
    /// Every attempt failed with a retryable error; carries the last one.
    ExhaustedRetries(E),
    /// An attempt failed with a non-retryable error.
    FatalError(E),
}

impl<T, E> RetryOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Collapse into a `Result`, losing the exhausted/fatal distinction.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Success(value) => Ok(value),
            Self::ExhaustedRetries(e) | Self::FatalError(e) => Err(e),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Executor
// ═══════════════════════════════════════════════════════════════════════════════

/// Run `operation` until it succeeds, fails fatally, or attempts run out.
pub async fn retry<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return RetryOutcome::Success(value);
            }
            Err(error) if !error.is_retryable() => {
                debug!(attempt, error = %error, "Non-retryable error");
                return RetryOutcome::FatalError(error);
            }
            Err(error) if attempt >= max_attempts => {
                warn!(max_attempts, error = %error, "Max attempts exceeded");
                return RetryOutcome::ExhaustedRetries(error);
            }
            Err(error) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Attempt failed, retrying"
                );
                counter!("upstream_retries_total").increment(1);

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
