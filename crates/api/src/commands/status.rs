//! Status reporting

use std::fmt;

use serde::Serialize;
use tern_domain::{AuthenticationState, QueueStatus, RateLimitWindow, Result};

use crate::context::AppContext;
use crate::utils::execute_logged;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub state: AuthenticationState,
    pub queue: QueueStatus,
    pub rate_limits: Vec<RateLimitWindow>,
    pub persistent_queue: bool,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            AuthenticationState::Authenticated { username } => {
                writeln!(f, "State:   authenticated as @{username}")?;
            }
            AuthenticationState::Error { kind } => writeln!(f, "State:   error ({kind:?})")?,
            other => writeln!(f, "State:   {}", other.label())?,
        }

        write!(f, "Queue:   {} pending, {} failed", self.queue.pending, self.queue.failed)?;
        if let Some(next) = self.queue.next_retry_at {
            write!(f, ", next retry {}", next.to_rfc3339())?;
        }
        if !self.persistent_queue {
            write!(f, " (in memory)")?;
        }

        for window in &self.rate_limits {
            write!(
                f,
                "\nLimit:   {} {}/{} until {}",
                window.endpoint,
                window.remaining,
                window.limit,
                window.reset_at.to_rfc3339()
            )?;
        }
        Ok(())
    }
}

/// Current authentication state, queue counters and known quota windows.
///
/// # Errors
/// Never fails today; kept fallible like the other commands.
pub async fn status(ctx: &AppContext) -> Result<StatusReport> {
    execute_logged("status::status", || async {
        Ok(StatusReport {
            state: ctx.machine.state(),
            queue: ctx.machine.queue().status().await,
            rate_limits: ctx.machine.rate_limits().snapshot(),
            persistent_queue: ctx.persistent_queue(),
        })
    })
    .await
}
