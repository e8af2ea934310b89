//! Resilience patterns for outbound API calls
//!
//! - **Rate-limit tracking**: per-endpoint quota windows learned from
//!   response headers, gating calls until the window resets
//! - **Backoff**: bounded exponential delays with uniform jitter for the
//!   retry queue

pub mod backoff;
pub mod rate_limiter;

pub use backoff::{ExponentialBackoff, Jitter};
pub use rate_limiter::{rate_limit_from_headers, RateLimitDecision, RateLimitTracker};
