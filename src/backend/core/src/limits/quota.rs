//! Global per-minute budget for the text-generation upstream.

use super::store::CounterStore;
use crate::error::{AppError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Counter key shared by every caller.
pub const QUOTA_KEY: &str = "upstream-quota:global";

const QUOTA_WINDOW: Duration = Duration::from_secs(60);

/// One counter for the whole process, independent of caller identity.
#[derive(Debug, Clone)]
pub struct UpstreamQuota {
    per_minute: u64,
    store: Arc<CounterStore>,
}

impl UpstreamQuota {
    pub fn new(per_minute: u64, store: Arc<CounterStore>) -> Self {
        Self { per_minute, store }
    }

    pub fn per_minute(&self) -> u64 {
        self.per_minute
    }

    /// Take one unit of budget or fail with `QuotaExceeded`.
    pub fn acquire(&self) -> Result<()> {
        let decision = self.store.check(QUOTA_KEY, QUOTA_WINDOW, self.per_minute);
        if decision.admitted {
            return Ok(());
        }

        Err(AppError::quota_exceeded("AI service is busy, please try again shortly")
            .with_retry_after(decision.retry_after_secs.unwrap_or(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorCode;

    #[test]
    fn test_quota_exhausts_regardless_of_caller() {
        let clock = ManualClock::starting_now();
        let store = Arc::new(CounterStore::with_clock(clock.clone()));
        let quota = UpstreamQuota::new(2, store.clone());

        assert!(quota.acquire().is_ok());
        assert!(quota.acquire().is_ok());
        let err = quota.acquire().unwrap_err();
        assert_eq!(err.code(), ErrorCode::QuotaExceeded);

        // Per-client keys in the same store are untouched.
        assert!(store.check("ai:1.1.1.1:/api/ai", QUOTA_WINDOW, 1).admitted);

        clock.advance_ms(60_001);
        assert!(quota.acquire().is_ok());
    }
}
