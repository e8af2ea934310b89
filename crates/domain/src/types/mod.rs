//! Domain types and models
//!
//! Authentication, posting and rate-limit types shared by the core and its
//! adapters.

pub mod auth;
pub mod posting;
pub mod rate_limit;

pub use auth::{AuthenticationState, CallbackResult, UserProfile};
pub use posting::{
    DrainTrigger, FailedPost, PostFailureKind, PostOutcome, PostReceipt, QueueSnapshot,
    QueueStatus, QueuedPost,
};
pub use rate_limit::{RateLimitEvent, RateLimitSnapshot, RateLimitWindow};
