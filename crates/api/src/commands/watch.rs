//! Long-running mode: keep draining the queue until interrupted

use std::future::Future;

use tern_domain::{RateLimitEvent, Result};
use tracing::{info, warn};

use crate::context::AppContext;

/// Run the background drain worker until `until` resolves.
///
/// Authentication state changes and rate-limit events are logged as they
/// happen.
///
/// # Errors
/// Never fails today; kept fallible like the other commands.
pub async fn watch<F>(ctx: &AppContext, until: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let mut states = ctx.machine.subscribe();
    let mut limits = ctx.rate_limit_events.subscribe();
    let mut queue = ctx.machine.queue().subscribe();

    ctx.machine.start_drain_worker();
    info!(state = ctx.machine.state().label(), "Watching post queue");

    tokio::pin!(until);
    loop {
        tokio::select! {
            () = &mut until => break,
            Some(state) = states.recv() => {
                info!(state = state.label(), "Authentication state");
            }
            Some(event) = limits.recv() => match event {
                RateLimitEvent::Exceeded { endpoint, reset_at } => {
                    warn!(endpoint = %endpoint, reset_at = %reset_at, "Rate limit exhausted");
                }
                RateLimitEvent::Reset { endpoint } => info!(endpoint = %endpoint, "Rate limit window reset"),
                RateLimitEvent::Updated(window) => {
                    info!(endpoint = %window.endpoint, remaining = window.remaining, "Rate limit updated");
                }
            },
            Some(status) = queue.recv() => {
                info!(pending = status.pending, failed = status.failed, "Queue status");
            }
        }
    }

    info!("Stopping queue watcher");
    ctx.shutdown().await;
    Ok(())
}
