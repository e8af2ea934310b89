//! Traits for OAuth, credential storage and browser operations
//!
//! These traits enable dependency injection and testing by abstracting
//! external dependencies (OAuth servers, system keychain, system browser).

use async_trait::async_trait;
use tern_domain::Result;

use super::types::TokenSet;

/// Trait for OAuth client operations
#[async_trait]
pub trait OAuthClientTrait: Send + Sync {
    /// Begin an authorization attempt and return the URL to open.
    ///
    /// Any previous pending attempt is discarded.
    ///
    /// # Errors
    /// Returns `PKCEGenerationFailed` or `InvalidAuthorizationURL`.
    async fn start_authorization_flow(&self, scopes: &[String], redirect_uri: &str)
        -> Result<String>;

    /// Exchange the authorization code captured by the callback.
    ///
    /// # Errors
    /// Returns `MissingVerifier`, `StateMismatch` (no network call in either
    /// case), `TokenExchangeFailed`, `InvalidResponse` or `NetworkError`.
    async fn exchange_code_for_token(&self, code: &str, state: &str) -> Result<TokenSet>;

    /// Exchange a refresh token for a new token set.
    ///
    /// # Errors
    /// Returns the classified token endpoint failure.
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenSet>;

    /// Discard the pending authorization attempt, if any.
    async fn cancel_pending(&self);
}

/// Secure persistence for token sets, keyed by account identity.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// # Errors
    /// Returns `Keychain` if the store rejects the write.
    async fn put(&self, account: &str, tokens: &TokenSet) -> Result<()>;

    /// `Ok(None)` when nothing is stored for `account`.
    ///
    /// # Errors
    /// Returns `Keychain` if the store cannot be read.
    async fn get(&self, account: &str) -> Result<Option<TokenSet>>;

    /// Remove everything stored for `account`. Idempotent.
    ///
    /// # Errors
    /// Returns `Keychain` if the store rejects the deletion.
    async fn delete(&self, account: &str) -> Result<()>;
}

/// Opens URLs in the user's browser.
///
/// `open` may block while a platform opener runs; async callers move it to
/// the blocking pool.
pub trait BrowserLauncher: Send + Sync {
    /// # Errors
    /// Returns `BrowserLaunchFailed` or `UnsupportedPlatform`.
    fn open(&self, url: &str) -> Result<()>;
}
