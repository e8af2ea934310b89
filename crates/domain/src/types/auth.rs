//! Authentication state and OAuth callback types

use serde::{Deserialize, Serialize};

use crate::errors::AuthErrorKind;

/// Query parameters captured from the OAuth redirect.
///
/// Produced exactly once per authorization attempt by the loopback callback
/// server and consumed exactly once by the flow that started it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackResult {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackResult {
    /// Successful redirect carrying an authorization code.
    pub fn success(code: impl Into<String>, state: impl Into<String>) -> Self {
        Self { code: Some(code.into()), state: Some(state.into()), ..Self::default() }
    }

    /// Redirect reporting that the user (or server) denied the request.
    pub fn denied(error: impl Into<String>, description: Option<String>) -> Self {
        Self { error: Some(error.into()), error_description: description, ..Self::default() }
    }

    /// Build from raw query pairs. Unknown keys are ignored; the first
    /// occurrence of a key wins.
    pub fn from_query_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut result = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "code" => &mut result.code,
                "state" => &mut result.state,
                "error" => &mut result.error,
                "error_description" => &mut result.error_description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        result
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Externally observable authentication state.
///
/// Exactly one value is current at any time; transitions are serialized by
/// the state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthenticationState {
    #[default]
    Disconnected,
    Authenticating,
    Authenticated { username: String },
    Refreshing,
    Error { kind: AuthErrorKind },
}

impl AuthenticationState {
    /// Whether posting is permitted in this state.
    #[must_use]
    pub fn can_post(&self) -> bool {
        match self {
            Self::Authenticated { .. } | Self::Refreshing => true,
            Self::Disconnected | Self::Authenticating | Self::Error { .. } => false,
        }
    }

    /// Short label used in logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Authenticating => "authenticating",
            Self::Authenticated { .. } => "authenticated",
            Self::Refreshing => "refreshing",
            Self::Error { .. } => "error",
        }
    }
}

/// Minimal profile of the authenticated account (`GET /2/users/me`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
}
