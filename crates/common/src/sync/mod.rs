//! Synchronization primitives shared between components
//!
//! ## Submodules
//!
//! - **`feed`**: observable value streams with explicit subscribe /
//!   unsubscribe, used for authentication state, rate-limit events and queue
//!   status

pub mod feed;

pub use feed::{Feed, Subscription, SubscriptionId};
