//! Testing utilities and helpers
//!
//! In-memory doubles for the seams in [`crate::auth::traits`]:
//! - **[`mocks`]**: `MockKeychainProvider`, `MockOAuthClient`,
//!   `MockBrowserLauncher`
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use tern_common::auth::TokenManager;
//! use tern_common::testing::{MockKeychainProvider, MockOAuthClient};
//!
//! let manager = TokenManager::new(
//!     Arc::new(MockOAuthClient::new()),
//!     Arc::new(MockKeychainProvider::default()),
//!     "default",
//!     60,
//! );
//! assert_eq!(manager.account(), "default");
//! ```

pub mod mocks;

pub use mocks::{MockBrowserLauncher, MockKeychainProvider, MockOAuthClient};
pub use crate::time::{Clock, MockClock, SystemClock};
