//! Error types used throughout the application

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{RATE_LIMITED_MESSAGE, REFRESH_REJECTED_MESSAGE};
use crate::types::PostFailureKind;

/// Main error type for Tern
///
/// Every failure path in the authentication and posting core ends in one of
/// these variants. Variants are `Clone` so a single refresh outcome can be
/// fanned out to every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum TernError {
    #[error("PKCE generation failed: {0}")]
    PKCEGenerationFailed(String),

    #[error("Invalid authorization URL: {0}")]
    InvalidAuthorizationURL(String),

    #[error("OAuth state mismatch (possible CSRF)")]
    StateMismatch,

    #[error("No pending authorization request (missing PKCE verifier)")]
    MissingVerifier,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Token exchange failed with HTTP {status}: {body}")]
    TokenExchangeFailed { status: u16, body: String },

    #[error("Server error: {message}")]
    ServerError { message: String },

    #[error("Access denied by authorization server")]
    AccessDenied,

    #[error("Client id rejected by authorization server")]
    InvalidClientId,

    #[error("Failed to launch browser: {0}")]
    BrowserLaunchFailed(String),

    #[error("No system browser launcher available on this platform")]
    UnsupportedPlatform,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Rate limit exceeded until {reset_at}")]
    RateLimitExceeded { reset_at: DateTime<Utc> },

    #[error("Access token expired and no refresh token is available")]
    TokenExpired,

    #[error("Authorization revoked; re-authentication required")]
    AuthorizationRevoked,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Invalid post text: {reason}")]
    InvalidTweetText { reason: String },

    #[error("Timed out waiting for the OAuth callback")]
    CallbackTimeout,

    #[error("OAuth callback wait cancelled")]
    CallbackCancelled,

    #[error("OAuth callback is already being awaited")]
    CallbackAlreadyAwaited,

    #[error("Keychain error: {0}")]
    Keychain(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Tern operations
pub type Result<T> = std::result::Result<T, TernError>;

/// Copyable projection of [`TernError`] carried by
/// `AuthenticationState::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthErrorKind {
    PKCEGenerationFailed,
    InvalidAuthorizationURL,
    StateMismatch,
    MissingVerifier,
    InvalidResponse,
    TokenExchangeFailed { status: u16 },
    ServerError,
    AccessDenied,
    InvalidClientId,
    BrowserLaunchFailed,
    UnsupportedPlatform,
    NetworkError,
    RateLimitExceeded { reset_at: DateTime<Utc> },
    TokenExpired,
    AuthorizationRevoked,
    NotAuthenticated,
    InvalidTweetText,
    CallbackTimeout,
    CallbackCancelled,
    CallbackAlreadyAwaited,
    Keychain,
    Storage,
    Config,
    Internal,
}

impl TernError {
    /// Project this error onto its [`AuthErrorKind`].
    #[must_use]
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::PKCEGenerationFailed(_) => AuthErrorKind::PKCEGenerationFailed,
            Self::InvalidAuthorizationURL(_) => AuthErrorKind::InvalidAuthorizationURL,
            Self::StateMismatch => AuthErrorKind::StateMismatch,
            Self::MissingVerifier => AuthErrorKind::MissingVerifier,
            Self::InvalidResponse(_) => AuthErrorKind::InvalidResponse,
            Self::TokenExchangeFailed { status, .. } => {
                AuthErrorKind::TokenExchangeFailed { status: *status }
            }
            Self::ServerError { .. } => AuthErrorKind::ServerError,
            Self::AccessDenied => AuthErrorKind::AccessDenied,
            Self::InvalidClientId => AuthErrorKind::InvalidClientId,
            Self::BrowserLaunchFailed(_) => AuthErrorKind::BrowserLaunchFailed,
            Self::UnsupportedPlatform => AuthErrorKind::UnsupportedPlatform,
            Self::NetworkError(_) => AuthErrorKind::NetworkError,
            Self::RateLimitExceeded { reset_at } => {
                AuthErrorKind::RateLimitExceeded { reset_at: *reset_at }
            }
            Self::TokenExpired => AuthErrorKind::TokenExpired,
            Self::AuthorizationRevoked => AuthErrorKind::AuthorizationRevoked,
            Self::NotAuthenticated => AuthErrorKind::NotAuthenticated,
            Self::InvalidTweetText { .. } => AuthErrorKind::InvalidTweetText,
            Self::CallbackTimeout => AuthErrorKind::CallbackTimeout,
            Self::CallbackCancelled => AuthErrorKind::CallbackCancelled,
            Self::CallbackAlreadyAwaited => AuthErrorKind::CallbackAlreadyAwaited,
            Self::Keychain(_) => AuthErrorKind::Keychain,
            Self::Storage(_) => AuthErrorKind::Storage,
            Self::Config(_) => AuthErrorKind::Config,
            Self::Internal(_) => AuthErrorKind::Internal,
        }
    }

    /// Classify a posting failure.
    ///
    /// Returns `None` for errors that are not the outcome of a delivery
    /// attempt (configuration, keychain, callback plumbing).
    #[must_use]
    pub fn post_failure_kind(&self) -> Option<PostFailureKind> {
        match self {
            Self::NetworkError(_) => Some(PostFailureKind::Network),
            Self::RateLimitExceeded { .. } => Some(PostFailureKind::RateLimited),
            Self::ServerError { message } if message == RATE_LIMITED_MESSAGE => {
                Some(PostFailureKind::RateLimited)
            }
            Self::ServerError { message } if message == REFRESH_REJECTED_MESSAGE => {
                Some(PostFailureKind::AuthorizationRevoked)
            }
            Self::ServerError { .. } => Some(PostFailureKind::TransientServer),
            Self::InvalidTweetText { .. } => Some(PostFailureKind::InvalidContent),
            Self::AuthorizationRevoked
            | Self::AccessDenied
            | Self::InvalidClientId
            | Self::TokenExpired => Some(PostFailureKind::AuthorizationRevoked),
            _ => None,
        }
    }

    /// Whether a refresh-token exchange failure means the grant itself is no
    /// longer usable.
    #[must_use]
    pub fn is_refresh_rejection(&self) -> bool {
        match self {
            Self::AccessDenied | Self::InvalidClientId | Self::AuthorizationRevoked => true,
            Self::ServerError { message } => message == REFRESH_REJECTED_MESSAGE,
            _ => false,
        }
    }

    /// Whether this failure ends the current authorization and requires the
    /// user to authenticate again.
    #[must_use]
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            Self::StateMismatch
                | Self::AccessDenied
                | Self::InvalidClientId
                | Self::AuthorizationRevoked
                | Self::TokenExpired
        )
    }
}
