//! Request counting: the windowed counter store and the limiters built on it.

pub mod limiter;
pub mod quota;
pub mod store;

pub use limiter::{RateLimitConfig, RateLimitConfigBuilder, RateLimitResult, RateLimiter};
pub use quota::{UpstreamQuota, QUOTA_KEY};
pub use store::{CounterDecision, CounterRecord, CounterStore};
