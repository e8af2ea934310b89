//! Authentication commands

use std::fmt;

use serde::Serialize;
use tern_domain::{AuthenticationState, Result};

use crate::context::AppContext;
use crate::utils::execute_logged;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthReport {
    pub username: String,
}

impl fmt::Display for AuthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Authenticated as @{}", self.username)
    }
}

/// Run the browser consent flow.
///
/// # Errors
/// Any authorization failure (denied consent, state mismatch, timeout).
pub async fn authenticate(ctx: &AppContext) -> Result<AuthReport> {
    execute_logged("auth::authenticate", || async {
        let username = ctx.machine.authenticate().await?;
        Ok(AuthReport { username })
    })
    .await
}

/// Force a token refresh.
///
/// # Errors
/// `NotAuthenticated`, or the classified refresh failure.
pub async fn refresh(ctx: &AppContext) -> Result<AuthenticationState> {
    execute_logged("auth::refresh", || async {
        ctx.machine.refresh().await?;
        Ok(ctx.machine.state())
    })
    .await
}

/// Wipe stored tokens. Queued posts are kept.
///
/// # Errors
/// `Keychain` if the stored tokens could not be deleted.
pub async fn disconnect(ctx: &AppContext) -> Result<AuthenticationState> {
    execute_logged("auth::disconnect", || async {
        ctx.machine.disconnect().await?;
        Ok(ctx.machine.state())
    })
    .await
}
