//! OAuth 2.0 client implementation with PKCE support
//!
//! Handles the browser-based authorization flow against the X authorization
//! server:
//! - PKCE pair and state nonce generation
//! - Authorization URL building
//! - Authorization code exchange
//! - Token refresh, with token endpoint responses classified into typed
//!   failures

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use reqwest::{Client, Response, StatusCode};
use tern_domain::constants::{
    DEFAULT_RATE_LIMIT_WINDOW_SECS, RATE_LIMITED_MESSAGE, REFRESH_REJECTED_MESSAGE,
    SERVER_FAILURE_MESSAGE, TOKEN_ENDPOINT,
};
use tern_domain::{Result, TernError, TokenRequestEncoding};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::pkce::{self, PKCEPair};
use super::traits::OAuthClientTrait;
use super::types::{AuthorizationRequest, OAuthConfig, TokenResponse, TokenSet};
use crate::resilience::{rate_limit_from_headers, RateLimitTracker};
use crate::time::{Clock, SystemClock};

/// OAuth 2.0 client with PKCE support
///
/// Holds at most one pending [`AuthorizationRequest`]; starting a new flow
/// supersedes (and wipes) the previous one.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: OAuthConfig,
    http: Client,
    pending: Arc<Mutex<Option<AuthorizationRequest>>>,
    rate_limits: Option<Arc<RateLimitTracker>>,
    clock: Arc<dyn Clock>,
}

impl OAuthClient {
    /// Create a new OAuth client with the given configuration
    ///
    /// The underlying HTTP client caps every exchange at
    /// `config.resource_timeout`; token endpoint calls additionally use
    /// `config.request_timeout`.
    ///
    /// # Errors
    /// Returns `Internal` if the HTTP client cannot be constructed.
    pub fn new(config: OAuthConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.request_timeout)
            .timeout(config.resource_timeout)
            .build()
            .map_err(|e| TernError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http,
            pending: Arc::new(Mutex::new(None)),
            rate_limits: None,
            clock: Arc::new(SystemClock),
        })
    }

    /// Report token endpoint quota to `tracker` (endpoint `oauth2/token`).
    #[must_use]
    pub fn with_rate_limits(mut self, tracker: Arc<RateLimitTracker>) -> Self {
        self.rate_limits = Some(tracker);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get a reference to the OAuth configuration
    #[must_use]
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Whether an authorization attempt is waiting for its code.
    pub async fn has_pending(&self) -> bool {
        self.pending.lock().await.is_some()
    }

    /// Generate the authorization URL and remember the attempt.
    ///
    /// # Errors
    /// Returns `PKCEGenerationFailed` if entropy is unavailable and
    /// `InvalidAuthorizationURL` if the authorize endpoint or redirect URI
    /// do not parse.
    pub async fn start_authorization_flow(
        &self,
        scopes: &[String],
        redirect_uri: &str,
    ) -> Result<String> {
        Url::parse(redirect_uri).map_err(|e| {
            TernError::InvalidAuthorizationURL(format!("redirect URI {redirect_uri}: {e}"))
        })?;
        let mut url = Url::parse(&self.config.authorize_url)
            .map_err(|e| TernError::InvalidAuthorizationURL(e.to_string()))?;

        let pkce = PKCEPair::generate()?;
        let state = pkce::generate_state()?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", &state)
            .append_pair("code_challenge", pkce.challenge())
            .append_pair("code_challenge_method", pkce.challenge_method());

        let request = AuthorizationRequest {
            state,
            pkce,
            redirect_uri: redirect_uri.to_string(),
            scopes: scopes.to_vec(),
            created_at: self.clock.now(),
        };

        if self.pending.lock().await.replace(request).is_some() {
            debug!("Superseded previous pending authorization request");
        }
        info!(redirect_uri, "Authorization flow started");

        Ok(url.into())
    }

    /// Exchange authorization code for tokens
    ///
    /// The pending request is consumed on every outcome.
    ///
    /// # Errors
    /// - `MissingVerifier` if no flow is pending
    /// - `StateMismatch` if `state` does not match (no network call is made)
    /// - `TokenExchangeFailed` on any non-200 response
    /// - `InvalidResponse` if the 200 body is malformed
    /// - `NetworkError` on transport failure
    pub async fn exchange_code_for_token(&self, code: &str, state: &str) -> Result<TokenSet> {
        let request = self.pending.lock().await.take().ok_or(TernError::MissingVerifier)?;

        if !pkce::validate_state(&request.state, state) {
            warn!("OAuth callback state mismatch; discarding authorization request");
            return Err(TernError::StateMismatch);
        }

        let params = vec![
            ("grant_type", "authorization_code".to_string()),
            ("client_id", self.config.client_id.clone()),
            ("code", code.to_string()),
            ("redirect_uri", request.redirect_uri.clone()),
            ("code_verifier", request.pkce.verifier().to_string()),
        ];
        drop(request);

        let response = self.post_token_request(&params).await?;
        let status = response.status();
        debug!(status = status.as_u16(), "Authorization code exchange response");

        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(TernError::TokenExchangeFailed { status: status.as_u16(), body });
        }

        let tokens = self.parse_token_response(response).await?;
        info!("Authorization code exchanged for tokens");
        Ok(tokens)
    }

    /// Refresh access token using refresh token
    ///
    /// A response without a refresh token yields a [`TokenSet`] without one;
    /// the token manager carries the previous refresh token forward.
    ///
    /// # Errors
    /// - 400 → `ServerError("invalid refresh token")`
    /// - 401 → `AccessDenied`
    /// - 403 → `InvalidClientId`
    /// - 429 → `ServerError("rate limited")`
    /// - 5xx → `ServerError("server error")`
    /// - other non-200 → `TokenExchangeFailed`
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenSet> {
        if refresh_token.is_empty() {
            return Err(TernError::TokenExpired);
        }

        let params = vec![
            ("grant_type", "refresh_token".to_string()),
            ("client_id", self.config.client_id.clone()),
            ("refresh_token", refresh_token.to_string()),
        ];

        let response = self.post_token_request(&params).await?;
        let status = response.status();
        debug!(status = status.as_u16(), "Token refresh response");
        self.record_rate_limit(&response);

        match status {
            StatusCode::OK => {
                let tokens = self.parse_token_response(response).await?;
                info!("Access token refreshed");
                Ok(tokens)
            }
            StatusCode::BAD_REQUEST => {
                Err(TernError::ServerError { message: REFRESH_REJECTED_MESSAGE.to_string() })
            }
            StatusCode::UNAUTHORIZED => Err(TernError::AccessDenied),
            StatusCode::FORBIDDEN => Err(TernError::InvalidClientId),
            StatusCode::TOO_MANY_REQUESTS => {
                Err(TernError::ServerError { message: RATE_LIMITED_MESSAGE.to_string() })
            }
            status if status.is_server_error() => {
                Err(TernError::ServerError { message: SERVER_FAILURE_MESSAGE.to_string() })
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(TernError::TokenExchangeFailed { status: status.as_u16(), body })
            }
        }
    }

    /// Discard the pending authorization request.
    pub async fn cancel_pending(&self) {
        if self.pending.lock().await.take().is_some() {
            debug!("Pending authorization request cancelled");
        }
    }

    async fn post_token_request(&self, params: &[(&'static str, String)]) -> Result<Response> {
        let request = self.http.post(&self.config.token_url).timeout(self.config.request_timeout);
        let request = match self.config.encoding {
            TokenRequestEncoding::Json => {
                let body: serde_json::Map<String, serde_json::Value> = params
                    .iter()
                    .map(|(key, value)| ((*key).to_string(), serde_json::Value::String(value.clone())))
                    .collect();
                request.json(&body)
            }
            TokenRequestEncoding::Form => request.form(params),
        };

        request.send().await.map_err(|e| TernError::NetworkError(e.to_string()))
    }

    async fn parse_token_response(&self, response: Response) -> Result<TokenSet> {
        let received_at = self.clock.now();
        let parsed: TokenResponse =
            response.json().await.map_err(|e| TernError::InvalidResponse(e.to_string()))?;
        if parsed.access_token.is_empty() {
            return Err(TernError::InvalidResponse("empty access_token".to_string()));
        }
        Ok(parsed.into_token_set(received_at))
    }

    fn record_rate_limit(&self, response: &Response) {
        let Some(tracker) = &self.rate_limits else {
            return;
        };
        match rate_limit_from_headers(response.headers()) {
            Some(snapshot) => {
                tracker.record_snapshot(TOKEN_ENDPOINT, snapshot);
            }
            None if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                let reset_at = self.clock.now() + ChronoDuration::seconds(DEFAULT_RATE_LIMIT_WINDOW_SECS);
                tracker.record_exhausted(TOKEN_ENDPOINT, reset_at);
            }
            None => {}
        }
    }
}

#[async_trait]
impl OAuthClientTrait for OAuthClient {
    async fn start_authorization_flow(
        &self,
        scopes: &[String],
        redirect_uri: &str,
    ) -> Result<String> {
        self.start_authorization_flow(scopes, redirect_uri).await
    }

    async fn exchange_code_for_token(&self, code: &str, state: &str) -> Result<TokenSet> {
        self.exchange_code_for_token(code, state).await
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenSet> {
        self.refresh_access_token(refresh_token).await
    }

    async fn cancel_pending(&self) {
        self.cancel_pending().await;
    }
}
