//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! application.

// OAuth endpoints (X API v2)
pub const DEFAULT_AUTHORIZE_URL: &str = "https://twitter.com/i/oauth2/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://api.twitter.com/2/oauth2/token";
pub const DEFAULT_API_BASE_URL: &str = "https://api.twitter.com";
pub const DEFAULT_SCOPES: &[&str] = &["tweet.read", "tweet.write", "users.read", "offline.access"];

// Loopback callback server
pub const DEFAULT_CALLBACK_HOST: &str = "127.0.0.1";
pub const DEFAULT_CALLBACK_PATH: &str = "/callback";
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;

// Authentication HTTP timeouts
pub const AUTH_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const AUTH_RESOURCE_TIMEOUT_SECS: u64 = 60;

// Token lifecycle
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 60;
pub const DEFAULT_ACCOUNT_ID: &str = "default";
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "tern.x";

// Posting
pub const MAX_POST_CHARS: usize = 280;
pub const POSTS_ENDPOINT: &str = "2/tweets";
pub const USERS_ME_ENDPOINT: &str = "2/users/me";
pub const TOKEN_ENDPOINT: &str = "oauth2/token";

// Rate limiting
/// Fallback window length when a 429 carries no `x-rate-limit-reset` header.
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: i64 = 900;

// Token endpoint failure messages carried by `TernError::ServerError`
pub const REFRESH_REJECTED_MESSAGE: &str = "invalid refresh token";
pub const RATE_LIMITED_MESSAGE: &str = "rate limited";
pub const SERVER_FAILURE_MESSAGE: &str = "server error";

// Retry queue
pub const DEFAULT_QUEUE_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_QUEUE_BASE_DELAY_MS: u64 = 2_000;
pub const DEFAULT_QUEUE_MAX_DELAY_MS: u64 = 300_000;
pub const DEFAULT_QUEUE_JITTER_MS: u64 = 1_000;
pub const DEFAULT_QUEUE_TICK_INTERVAL_SECS: u64 = 30;
pub const QUEUE_PERSISTENCE_VERSION: u32 = 1;
