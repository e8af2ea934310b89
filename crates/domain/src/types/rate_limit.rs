//! Rate-limit window types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quota window for a single endpoint.
///
/// `reset_at` for a given endpoint never moves backwards; the tracker only
/// accepts a replacement whose `reset_at` is not older than the stored one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    pub endpoint: String,
    pub remaining: u32,
    pub limit: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitWindow {
    /// Whether the window blocks new calls at `now`.
    #[must_use]
    pub fn is_exhausted_at(&self, now: DateTime<Utc>) -> bool {
        self.remaining == 0 && now < self.reset_at
    }
}

/// Rate-limit metadata parsed from a single response
/// (`x-rate-limit-remaining`, `x-rate-limit-limit`, `x-rate-limit-reset`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub remaining: u32,
    pub limit: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitSnapshot {
    /// Attach the snapshot to an endpoint.
    #[must_use]
    pub fn into_window(self, endpoint: impl Into<String>) -> RateLimitWindow {
        RateLimitWindow {
            endpoint: endpoint.into(),
            remaining: self.remaining,
            limit: self.limit,
            reset_at: self.reset_at,
        }
    }
}

/// Events published on the rate-limit status feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RateLimitEvent {
    Updated(RateLimitWindow),
    Exceeded { endpoint: String, reset_at: DateTime<Utc> },
    Reset { endpoint: String },
}
