//! Authentication state transition table

use tern_domain::{AuthErrorKind, AuthenticationState};

/// Something that happened to the authentication session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// `authenticate()` or `retry()` started an attempt.
    Begin,
    /// The attempt produced stored tokens.
    Succeeded { username: String },
    /// A token refresh started.
    RefreshStarted,
    /// A refresh finished without invalidating the session (including
    /// transient failures).
    RefreshCompleted { username: String },
    /// The attempt or session failed.
    Failed { kind: AuthErrorKind },
    /// `disconnect()`.
    Disconnect,
    /// Stored tokens were found at startup.
    Restored { username: String },
}

impl AuthEvent {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::Succeeded { .. } => "succeeded",
            Self::RefreshStarted => "refresh_started",
            Self::RefreshCompleted { .. } => "refresh_completed",
            Self::Failed { .. } => "failed",
            Self::Disconnect => "disconnect",
            Self::Restored { .. } => "restored",
        }
    }
}

/// The state `event` leads to from `state`, or `None` if the transition is
/// illegal.
#[must_use]
pub fn next_state(state: &AuthenticationState, event: &AuthEvent) -> Option<AuthenticationState> {
    use AuthEvent as E;
    use AuthenticationState as S;

    match (state, event) {
        (
            S::Disconnected | S::Authenticating | S::Authenticated { .. } | S::Refreshing | S::Error { .. },
            E::Disconnect,
        ) => Some(S::Disconnected),

        (S::Disconnected | S::Authenticating | S::Authenticated { .. } | S::Error { .. }, E::Begin) => {
            Some(S::Authenticating)
        }
        (S::Refreshing, E::Begin) => None,

        (S::Authenticating, E::Succeeded { username }) => {
            Some(S::Authenticated { username: username.clone() })
        }
        (
            S::Disconnected | S::Authenticated { .. } | S::Refreshing | S::Error { .. },
            E::Succeeded { .. },
        ) => None,

        (S::Authenticated { .. } | S::Refreshing, E::RefreshStarted) => Some(S::Refreshing),
        (S::Disconnected | S::Authenticating | S::Error { .. }, E::RefreshStarted) => None,

        (S::Authenticated { .. } | S::Refreshing, E::RefreshCompleted { username }) => {
            Some(S::Authenticated { username: username.clone() })
        }
        (S::Disconnected | S::Authenticating | S::Error { .. }, E::RefreshCompleted { .. }) => None,

        (S::Authenticating | S::Authenticated { .. } | S::Refreshing, E::Failed { kind }) => {
            Some(S::Error { kind: *kind })
        }
        (S::Disconnected | S::Error { .. }, E::Failed { .. }) => None,

        (S::Disconnected, E::Restored { username }) => {
            Some(S::Authenticated { username: username.clone() })
        }
        (
            S::Authenticating | S::Authenticated { .. } | S::Refreshing | S::Error { .. },
            E::Restored { .. },
        ) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticated() -> AuthenticationState {
        AuthenticationState::Authenticated { username: "tern".into() }
    }

    fn error() -> AuthenticationState {
        AuthenticationState::Error { kind: AuthErrorKind::StateMismatch }
    }

    #[test]
    fn happy_path() {
        let state = next_state(&AuthenticationState::Disconnected, &AuthEvent::Begin).unwrap();
        assert_eq!(state, AuthenticationState::Authenticating);

        let state =
            next_state(&state, &AuthEvent::Succeeded { username: "tern".into() }).unwrap();
        assert_eq!(state, authenticated());

        let state = next_state(&state, &AuthEvent::RefreshStarted).unwrap();
        assert_eq!(state, AuthenticationState::Refreshing);

        let state =
            next_state(&state, &AuthEvent::RefreshCompleted { username: "tern".into() }).unwrap();
        assert_eq!(state, authenticated());
    }

    #[test]
    fn failures_and_retry() {
        let failed = AuthEvent::Failed { kind: AuthErrorKind::StateMismatch };
        assert_eq!(next_state(&AuthenticationState::Authenticating, &failed), Some(error()));
        assert_eq!(next_state(&AuthenticationState::Refreshing, &failed), Some(error()));
        assert_eq!(next_state(&error(), &AuthEvent::Begin), Some(AuthenticationState::Authenticating));
        assert_eq!(next_state(&error(), &failed), None);
    }

    #[test]
    fn disconnect_from_anywhere() {
        for state in [
            AuthenticationState::Disconnected,
            AuthenticationState::Authenticating,
            authenticated(),
            AuthenticationState::Refreshing,
            error(),
        ] {
            assert_eq!(
                next_state(&state, &AuthEvent::Disconnect),
                Some(AuthenticationState::Disconnected)
            );
        }
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let restored = AuthEvent::Restored { username: "tern".into() };
        assert_eq!(next_state(&authenticated(), &restored), None);
        assert_eq!(next_state(&AuthenticationState::Refreshing, &AuthEvent::Begin), None);
        assert_eq!(
            next_state(&AuthenticationState::Disconnected, &AuthEvent::Succeeded { username: "x".into() }),
            None
        );
        assert_eq!(next_state(&AuthenticationState::Disconnected, &AuthEvent::RefreshStarted), None);
        assert_eq!(
            next_state(&AuthenticationState::Disconnected, &restored),
            Some(authenticated())
        );
    }
}
