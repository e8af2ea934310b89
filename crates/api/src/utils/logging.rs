use std::time::Duration;

use tern_domain::TernError;
use tracing::{info, warn};

/// Log the outcome of a command execution with structured fields.
///
/// `command` must be a stable identifier (e.g. `"posting::post"`) and never
/// carry user content or secrets.
#[inline]
pub fn log_command_execution(
    command: &str,
    elapsed: Duration,
    success: bool,
    error_type: Option<&'static str>,
) {
    let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

    if success {
        info!(command, duration_ms, "command_execution_success");
    } else {
        warn!(command, duration_ms, error_type, "command_execution_failure");
    }
}

/// Convert a `TernError` into a stable label suitable for logging.
#[inline]
pub fn error_label(error: &TernError) -> &'static str {
    match error {
        TernError::PKCEGenerationFailed(_)
        | TernError::InvalidAuthorizationURL(_)
        | TernError::StateMismatch
        | TernError::MissingVerifier
        | TernError::TokenExchangeFailed { .. }
        | TernError::AccessDenied
        | TernError::InvalidClientId
        | TernError::TokenExpired
        | TernError::AuthorizationRevoked
        | TernError::NotAuthenticated => "auth",
        TernError::CallbackTimeout
        | TernError::CallbackCancelled
        | TernError::CallbackAlreadyAwaited => "callback",
        TernError::BrowserLaunchFailed(_) | TernError::UnsupportedPlatform => "platform",
        TernError::NetworkError(_) => "network",
        TernError::ServerError { .. } | TernError::InvalidResponse(_) => "server",
        TernError::RateLimitExceeded { .. } => "rate_limit",
        TernError::InvalidTweetText { .. } => "invalid_input",
        TernError::Keychain(_) => "keychain",
        TernError::Storage(_) => "storage",
        TernError::Config(_) => "config",
        TernError::Internal(_) => "internal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_group_related_errors() {
        assert_eq!(error_label(&TernError::StateMismatch), "auth");
        assert_eq!(error_label(&TernError::CallbackTimeout), "callback");
        assert_eq!(error_label(&TernError::InvalidTweetText { reason: "empty".into() }), "invalid_input");
        assert_eq!(error_label(&TernError::Storage("disk full".into())), "storage");
    }
}
