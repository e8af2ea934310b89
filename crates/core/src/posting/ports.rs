//! Port interfaces for posting
//!
//! These traits define the boundaries between the posting logic and the
//! X API client and queue persistence implementations.

use async_trait::async_trait;
use tern_domain::{PostReceipt, QueueSnapshot, QueuedPost, RateLimitSnapshot, Result, UserProfile};

/// Outcome of one API call together with the quota the server reported.
///
/// The rate-limit snapshot is carried on failures too, so a 429 still
/// updates the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse<T> {
    pub result: Result<T>,
    pub rate_limit: Option<RateLimitSnapshot>,
}

impl<T> ApiResponse<T> {
    pub fn new(result: Result<T>, rate_limit: Option<RateLimitSnapshot>) -> Self {
        Self { result, rate_limit }
    }
}

/// X API v2 operations used by the posting flow.
///
/// Implementations classify responses as follows:
/// - 400/403 → `InvalidTweetText`
/// - 401 → `AccessDenied`
/// - 429 → `RateLimitExceeded`
/// - 5xx → `ServerError`
/// - transport failure → `NetworkError`
#[async_trait]
pub trait PostingApi: Send + Sync {
    /// `POST /2/tweets`
    async fn create_post(&self, access_token: &str, text: &str) -> ApiResponse<PostReceipt>;

    /// `GET /2/users/me`
    async fn current_user(&self, access_token: &str) -> ApiResponse<UserProfile>;
}

/// Durable storage for the retry queue.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Load the persisted queue; an empty snapshot when nothing was saved.
    async fn load(&self) -> Result<QueueSnapshot>;

    /// Replace the persisted queue with `snapshot`.
    async fn save(&self, snapshot: &QueueSnapshot) -> Result<()>;
}

/// Performs one delivery attempt for a queued post.
#[async_trait]
pub trait PostDeliverer: Send + Sync {
    async fn deliver(&self, post: &QueuedPost) -> Result<PostReceipt>;
}
