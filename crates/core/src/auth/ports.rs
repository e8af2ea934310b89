//! Port interfaces for the authorization redirect
//!
//! The loopback HTTP listener lives in infrastructure; the state machine
//! only sees these traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tern_domain::{CallbackResult, Result};

/// A running single-use listener for the OAuth redirect.
#[async_trait]
pub trait CallbackListener: Send + Sync {
    /// Redirect URI to register with the authorization request.
    fn redirect_uri(&self) -> String;

    /// Wait for the redirect.
    ///
    /// # Errors
    /// - `CallbackTimeout` when `timeout` elapses first
    /// - `CallbackCancelled` after [`cancel`](Self::cancel) or
    ///   [`stop`](Self::stop)
    /// - `CallbackAlreadyAwaited` if another wait is outstanding
    async fn wait_for_callback(&self, timeout: Duration) -> Result<CallbackResult>;

    /// Resolve the outstanding wait with `CallbackCancelled`.
    fn cancel(&self);

    /// Release the port. Idempotent.
    fn stop(&self);
}

/// Starts a fresh listener for each authorization attempt.
#[async_trait]
pub trait CallbackListenerFactory: Send + Sync {
    /// # Errors
    /// Returns `NetworkError` if the port cannot be bound.
    async fn start(&self) -> Result<Arc<dyn CallbackListener>>;
}
