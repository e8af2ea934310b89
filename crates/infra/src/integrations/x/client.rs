//! X API v2 client for posting and profile lookup
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tern_common::resilience::rate_limit_from_headers;
use tern_common::{Clock, SystemClock};
use tern_core::{ApiResponse, PostingApi};
use tern_domain::constants::{DEFAULT_RATE_LIMIT_WINDOW_SECS, POSTS_ENDPOINT, USERS_ME_ENDPOINT};
use tern_domain::{
    ApiSettings, PostReceipt, RateLimitSnapshot, Result, TernError, UserProfile,
};
use tracing::{debug, info, warn};
use url::Url;

use super::types::{ApiErrorBody, CreatePostRequest, CreatedPost, DataEnvelope, UserData};
use crate::http::HttpClient;

const READ_ATTEMPTS: u32 = 3;

/// Client for the two X API endpoints Tern uses.
///
/// Post creation goes through a single-attempt HTTP client: a duplicate
/// tweet is worse than a queued one, so retries are left to the post queue.
/// Profile reads retry transport failures and 5xx responses.
pub struct XApiClient {
    post_http: HttpClient,
    read_http: HttpClient,
    base_url: Url,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for XApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XApiClient").field("base_url", &self.base_url.as_str()).finish_non_exhaustive()
    }
}

impl XApiClient {
    /// # Errors
    /// - `Config` if `base_url` is not an absolute URL
    /// - `Internal` if the HTTP client cannot be built
    pub fn new(settings: &ApiSettings) -> Result<Self> {
        let base_url = parse_base_url(&settings.base_url)?;
        let timeout = Duration::from_secs(settings.request_timeout_secs);

        let builder = || {
            let builder = HttpClient::builder().timeout(timeout);
            match &settings.user_agent {
                Some(agent) => builder.user_agent(agent.clone()),
                None => builder.user_agent(concat!("tern/", env!("CARGO_PKG_VERSION"))),
            }
        };

        Ok(Self {
            post_http: builder().build()?,
            read_http: builder().attempts(READ_ATTEMPTS).build()?,
            base_url,
            clock: Arc::new(SystemClock),
        })
    }

    /// Clock used to derive a reset time when a 429 carries no headers.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|err| TernError::Config(format!("invalid API endpoint '{path}': {err}")))
    }

    async fn execute<W, T>(&self, http: &HttpClient, builder: RequestBuilder) -> ApiResponse<T>
    where
        W: DeserializeOwned,
        T: From<W>,
    {
        let response = match http.send(builder).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "X API request failed");
                return ApiResponse::new(Err(err), None);
            }
        };

        let status = response.status();
        let rate_limit = rate_limit_from_headers(response.headers());
        debug!(status = status.as_u16(), remaining = ?rate_limit.map(|s| s.remaining), "X API response");

        let result = if status.is_success() {
            response
                .json::<DataEnvelope<W>>()
                .await
                .map(|envelope| T::from(envelope.data))
                .map_err(|err| TernError::InvalidResponse(format!("unexpected response body: {err}")))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(self.classify_failure(status, &body, rate_limit.as_ref()))
        };

        ApiResponse::new(result, rate_limit)
    }

    fn classify_failure(
        &self,
        status: StatusCode,
        body: &str,
        rate_limit: Option<&RateLimitSnapshot>,
    ) -> TernError {
        let reason = serde_json::from_str::<ApiErrorBody>(body).ok().and_then(|parsed| parsed.reason());
        let code = status.as_u16();

        match code {
            400 | 403 => TernError::InvalidTweetText {
                reason: reason.unwrap_or_else(|| format!("rejected with HTTP {code}")),
            },
            401 => TernError::AccessDenied,
            429 => {
                let reset_at = rate_limit.map_or_else(
                    || self.clock.now() + chrono::Duration::seconds(DEFAULT_RATE_LIMIT_WINDOW_SECS),
                    |snapshot| snapshot.reset_at,
                );
                warn!(%reset_at, "X API rate limit exceeded");
                TernError::RateLimitExceeded { reset_at }
            }
            500..=599 => TernError::ServerError {
                message: match reason {
                    Some(reason) => format!("HTTP {code}: {reason}"),
                    None => format!("HTTP {code}"),
                },
            },
            _ => TernError::InvalidResponse(format!("unexpected HTTP status {status}")),
        }
    }
}

#[async_trait]
impl PostingApi for XApiClient {
    async fn create_post(&self, access_token: &str, text: &str) -> ApiResponse<PostReceipt> {
        let url = match self.endpoint(POSTS_ENDPOINT) {
            Ok(url) => url,
            Err(err) => return ApiResponse::new(Err(err), None),
        };

        let builder = self
            .post_http
            .request(Method::POST, url)
            .bearer_auth(access_token)
            .json(&CreatePostRequest { text });

        let response = self.execute::<CreatedPost, PostReceipt>(&self.post_http, builder).await;
        if let Ok(receipt) = &response.result {
            info!(post_id = %receipt.id, "Post created");
        }
        response
    }

    async fn current_user(&self, access_token: &str) -> ApiResponse<UserProfile> {
        let url = match self.endpoint(USERS_ME_ENDPOINT) {
            Ok(url) => url,
            Err(err) => return ApiResponse::new(Err(err), None),
        };

        let builder = self.read_http.request(Method::GET, url).bearer_auth(access_token);
        self.execute::<UserData, UserProfile>(&self.read_http, builder).await
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)
        .map_err(|err| TernError::Config(format!("invalid API base URL '{raw}': {err}")))?;
    if url.cannot_be_a_base() {
        return Err(TernError::Config(format!("API base URL '{raw}' cannot carry a path")));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let url = parse_base_url("http://127.0.0.1:9000/mock").unwrap();
        assert_eq!(url.join(POSTS_ENDPOINT).unwrap().as_str(), "http://127.0.0.1:9000/mock/2/tweets");

        let url = parse_base_url("https://api.twitter.com").unwrap();
        assert_eq!(url.join(USERS_ME_ENDPOINT).unwrap().as_str(), "https://api.twitter.com/2/users/me");
    }

    #[test]
    fn rejects_relative_base_url() {
        assert!(matches!(parse_base_url("api.twitter.com"), Err(TernError::Config(_))));
    }
}
