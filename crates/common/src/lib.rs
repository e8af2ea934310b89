//! Shared building blocks for the Tern crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: PKCE primitives, token types, clock abstraction, backoff
//! - `runtime`: async infrastructure (OAuth flow coordinator, token manager,
//!   rate-limit tracker, observable feeds)
//! - `platform`: platform integrations (keychain credential storage)
//! - `test-utils`: in-memory doubles for the traits above

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod auth;
#[cfg(feature = "foundation")]
pub mod time;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;
#[cfg(feature = "runtime")]
pub mod sync;

// Platform tier
// -------------------------------------------------------------------
#[cfg(feature = "platform")]
pub mod security;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "test-utils", all(test, feature = "platform")))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "runtime")]
pub use resilience::{ExponentialBackoff, Jitter, RateLimitDecision, RateLimitTracker};
#[cfg(feature = "platform")]
pub use security::{KeychainError, KeychainProvider};
#[cfg(feature = "runtime")]
pub use sync::{Feed, Subscription, SubscriptionId};
#[cfg(feature = "foundation")]
pub use time::{Clock, MockClock, SystemClock};
