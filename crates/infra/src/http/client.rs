use std::time::Duration;

use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response, StatusCode};
use tern_common::ExponentialBackoff;
use tern_domain::{Result, TernError};
use tracing::debug;

use crate::errors::InfraError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin wrapper over `reqwest::Client` that retries transient failures.
///
/// A transport error or a 502/503/504 is retried with exponential backoff
/// until `attempts` is used up. Every other status, 429 included, is handed
/// back to the caller on the first response. A client built with one attempt
/// never resends, which is what post creation needs.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: ReqwestClient,
    attempts: u32,
    backoff: ExponentialBackoff,
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Send `builder`, resending it on transient failures.
    ///
    /// # Errors
    /// `NetworkError` once the last attempt fails at the transport level.
    /// HTTP error statuses are returned as responses.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let mut attempt = 1;
        loop {
            let request = builder
                .try_clone()
                .ok_or_else(|| TernError::Internal("streaming request bodies cannot be resent".into()))?
                .build()
                .map_err(|err| TernError::from(InfraError::from(err)))?;
            let method = request.method().clone();
            let url = request.url().clone();
            let last = attempt >= self.attempts;

            match self.client.execute(request).await {
                Ok(response) if last || !is_transient_status(response.status()) => {
                    debug!(attempt, %method, %url, status = response.status().as_u16(), "HTTP response");
                    return Ok(response);
                }
                Ok(response) => {
                    debug!(attempt, %method, %url, status = response.status().as_u16(), "Transient HTTP status; retrying");
                }
                Err(err) if last || !is_transient_error(&err) => {
                    debug!(attempt, %method, %url, error = %err, "HTTP request failed");
                    return Err(InfraError::from(err).into());
                }
                Err(err) => {
                    debug!(attempt, %method, %url, error = %err, "HTTP transport error; retrying");
                }
            }

            let delay = self.backoff.delay(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }
}

#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    attempts: u32,
    backoff: ExponentialBackoff,
    user_agent: Option<String>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            attempts: 1,
            backoff: ExponentialBackoff::new(Duration::from_millis(250), Duration::from_secs(2)),
            user_agent: None,
        }
    }
}

impl HttpClientBuilder {
    /// Whole-request timeout, connect included.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total attempts including the first one; clamped to at least 1.
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// # Errors
    /// `Internal` if the TLS backend cannot be initialized.
    pub fn build(self) -> Result<HttpClient> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout);
        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }
        let client = builder.build().map_err(|err| TernError::from(InfraError::from(err)))?;

        Ok(HttpClient { client, attempts: self.attempts, backoff: self.backoff })
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_transient_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn retrying(attempts: u32) -> HttpClient {
        HttpClient::builder()
            .attempts(attempts)
            .backoff(ExponentialBackoff::new(Duration::from_millis(5), Duration::from_millis(20)))
            .build()
            .expect("http client")
    }

    #[tokio::test]
    async fn resends_after_unavailable_until_success() {
        let server = MockServer::start().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        Mock::given(method("GET"))
            .and(path("/2/users/me"))
            .respond_with(move |_: &wiremock::Request| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    ResponseTemplate::new(503)
                } else {
                    ResponseTemplate::new(200)
                }
            })
            .mount(&server)
            .await;

        let client = retrying(3);
        let url = format!("{}/2/users/me", server.uri());
        let response = client.send(client.request(Method::GET, url)).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rate_limited_response_is_not_resent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        let client = retrying(3);
        let response =
            client.send(client.request(Method::GET, server.uri())).await.expect("response");
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn single_attempt_client_returns_first_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::builder().build().expect("http client");
        let url = format!("{}/2/tweets", server.uri());
        let response = client
            .send(client.request(Method::POST, url).json(&serde_json::json!({ "text": "hi" })))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn user_agent_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", "tern-test/1.0"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::builder().user_agent("tern-test/1.0").build().expect("http client");
        let response =
            client.send(client.request(Method::GET, server.uri())).await.expect("response");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let client = retrying(2);
        let result = client.send(client.request(Method::GET, format!("http://{addr}"))).await;
        assert!(matches!(result, Err(TernError::NetworkError(_))), "got {result:?}");
    }
}
