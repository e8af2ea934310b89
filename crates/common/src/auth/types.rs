//! OAuth 2.0 types and structures
//!
//! Token set, token endpoint payload, per-attempt authorization request and
//! flow configuration.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tern_domain::{OAuthSettings, TokenRequestEncoding};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::pkce::PKCEPair;

/// OAuth 2.0 access and refresh tokens with metadata
///
/// `expires_at` is the instant the access token stops being valid. A token
/// set without it never expires on its own but can still be refreshed after
/// a 401.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,

    /// Optional because the server only issues one for `offline.access`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    pub token_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Granted scopes (space-separated)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenSet {
    /// Create a bearer token set valid until `expires_at`.
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        scope: Option<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            token_type: "bearer".to_string(),
            expires_at,
            scope,
        }
    }

    /// Whether the access token is past its expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Whether the access token expires within `margin` of `now`.
    ///
    /// Token sets without an expiry never fall inside the margin.
    #[must_use]
    pub fn expires_within(&self, margin: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now + margin >= expires_at)
    }

    /// Seconds until expiry, `None` when no expiry is set.
    #[must_use]
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at.map(|expires_at| (expires_at - now).num_seconds())
    }

    #[must_use]
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|token| !token.is_empty())
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

/// OAuth token response from the authorization server (RFC 6749 §5.1).
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl TokenResponse {
    /// Convert to a [`TokenSet`], anchoring `expires_in` at `received_at`.
    #[must_use]
    pub fn into_token_set(self, received_at: DateTime<Utc>) -> TokenSet {
        let expires_at = self
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| received_at + chrono::Duration::seconds(secs));
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|token| !token.is_empty()),
            token_type: self.token_type,
            expires_at,
            scope: self.scope,
        }
    }
}

/// One in-flight authorization attempt.
///
/// Owned exclusively by the OAuth client; wiped when the attempt succeeds,
/// fails, is superseded or is cancelled.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct AuthorizationRequest {
    pub state: String,
    pub pkce: PKCEPair,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    #[zeroize(skip)]
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("state", &"[redacted]")
            .field("pkce", &self.pkce)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// OAuth client configuration for the X authorization server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthConfig {
    pub client_id: String,
    pub authorize_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    pub encoding: TokenRequestEncoding,
    /// Per-request timeout for token endpoint calls
    pub request_timeout: Duration,
    /// Overall ceiling for any single HTTP exchange
    pub resource_timeout: Duration,
}

impl OAuthConfig {
    /// Get scopes as space-separated string
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

impl From<&OAuthSettings> for OAuthConfig {
    fn from(settings: &OAuthSettings) -> Self {
        Self {
            client_id: settings.client_id.clone(),
            authorize_url: settings.authorize_url.clone(),
            token_url: settings.token_url.clone(),
            scopes: settings.scopes.clone(),
            encoding: settings.token_request_encoding,
            request_timeout: settings.request_timeout(),
            resource_timeout: settings.resource_timeout(),
        }
    }
}
