//! Posting and retry-queue types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::impl_domain_status_conversions;

/// Failure class of a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostFailureKind {
    Network,
    RateLimited,
    TransientServer,
    InvalidContent,
    AuthorizationRevoked,
}

impl_domain_status_conversions!(PostFailureKind {
    Network => "network",
    RateLimited => "rate_limited",
    TransientServer => "transient_server",
    InvalidContent => "invalid_content",
    AuthorizationRevoked => "authorization_revoked",
});

impl PostFailureKind {
    /// Only network, rate-limit and transient server failures are eligible
    /// for automatic re-attempt.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        match self {
            Self::Network | Self::RateLimited | Self::TransientServer => true,
            Self::InvalidContent | Self::AuthorizationRevoked => false,
        }
    }
}

/// A post waiting for another delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedPost {
    pub id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Number of delivery attempts that have failed so far.
    pub attempt_count: u32,
    pub last_error_kind: PostFailureKind,
    pub next_retry_at: DateTime<Utc>,
}

/// A post that exhausted its attempts or hit a non-retryable failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPost {
    pub post: QueuedPost,
    pub failed_at: DateTime<Utc>,
    pub reason: String,
}

/// Successful delivery (`{data: {id, text}}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReceipt {
    pub id: String,
    pub text: String,
}

/// Result of the `post` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PostOutcome {
    Delivered(PostReceipt),
    Queued { id: Uuid, kind: PostFailureKind },
}

/// Queue counters published on the queue-status feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub failed: usize,
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Persisted queue contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub pending: Vec<QueuedPost>,
    pub failed: Vec<FailedPost>,
}

/// Why a queue drain pass was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainTrigger {
    Reconnected,
    RateLimitWindowReset,
    TimerTick,
}

impl_domain_status_conversions!(DrainTrigger {
    Reconnected => "reconnected",
    RateLimitWindowReset => "rate_limit_window_reset",
    TimerTick => "timer_tick",
});

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(PostFailureKind::Network.is_retryable());
        assert!(PostFailureKind::RateLimited.is_retryable());
        assert!(PostFailureKind::TransientServer.is_retryable());
        assert!(!PostFailureKind::InvalidContent.is_retryable());
        assert!(!PostFailureKind::AuthorizationRevoked.is_retryable());
    }

    #[test]
    fn failure_kind_string_conversions() {
        assert_eq!(PostFailureKind::RateLimited.to_string(), "rate_limited");
        assert_eq!(
            PostFailureKind::from_str("TRANSIENT_SERVER").unwrap(),
            PostFailureKind::TransientServer
        );
        assert!(PostFailureKind::from_str("bogus").is_err());
    }

    #[test]
    fn drain_trigger_display() {
        assert_eq!(DrainTrigger::RateLimitWindowReset.to_string(), "rate_limit_window_reset");
    }
}
