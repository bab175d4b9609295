//! Tower middleware for Roastify Core.
pub mod rate_limit;

pub use rate_limit::{
    apply_rate_limit_headers, extract_client_identity, rejection_response, rejection_with_message, RateLimitLayer,
    RateLimitService,
};
