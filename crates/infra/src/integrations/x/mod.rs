//! X (Twitter) integration
//!
//! - [`XApiClient`]: `POST /2/tweets` and `GET /2/users/me`
//! - [`LoopbackCallbackServer`]: receives the OAuth redirect
//! - [`SystemBrowserLauncher`]: opens the consent page

pub mod browser;
pub mod client;
pub mod loopback;
mod types;

pub use browser::SystemBrowserLauncher;
pub use client::XApiClient;
pub use loopback::{LoopbackCallbackServer, LoopbackListenerFactory, LoopbackSettings};
