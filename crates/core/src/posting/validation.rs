//! Post text validation, applied before any network call.

use tern_domain::constants::MAX_POST_CHARS;
use tern_domain::{Result, TernError};

/// Reject empty, whitespace-only or over-long post text.
///
/// Length is counted in Unicode scalar values.
///
/// # Errors
/// Returns `InvalidTweetText` describing the violation.
pub fn validate_post_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(TernError::InvalidTweetText { reason: "post text is empty".to_string() });
    }

    let length = text.chars().count();
    if length > MAX_POST_CHARS {
        return Err(TernError::InvalidTweetText {
            reason: format!("post text is {length} characters; the limit is {MAX_POST_CHARS}"),
        });
    }
    Ok(())
}
