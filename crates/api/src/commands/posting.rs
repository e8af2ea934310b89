//! Posting and retry-queue commands

use std::fmt;

use serde::Serialize;
use tern_core::DrainReport;
use tern_domain::{DrainTrigger, FailedPost, PostOutcome, QueuedPost, Result};

use crate::context::AppContext;
use crate::utils::execute_logged;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PostReport(pub PostOutcome);

impl fmt::Display for PostReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            PostOutcome::Delivered(receipt) => write!(f, "Posted {}", receipt.id),
            PostOutcome::Queued { id, kind } => {
                write!(f, "Queued {id} for retry ({kind})")
            }
        }
    }
}

/// Publish `text`, queueing it on a retryable failure.
///
/// # Errors
/// `InvalidTweetText`, `NotAuthenticated`, or a non-retryable delivery
/// failure.
pub async fn post(ctx: &AppContext, text: &str) -> Result<PostReport> {
    execute_logged("posting::post", || async { ctx.machine.post(text).await.map(PostReport) }).await
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DrainSummary(pub DrainReport);

impl fmt::Display for DrainSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = &self.0;
        write!(
            f,
            "Delivered {}, rescheduled {}, failed {}, deferred {}",
            report.delivered.len(),
            report.rescheduled.len(),
            report.failed.len(),
            report.deferred
        )?;
        if let Some(err) = &report.save_error {
            write!(f, " (queue not saved: {err})")?;
        }
        Ok(())
    }
}

/// Attempt every due queued post now.
///
/// A store failure during the pass is carried in the report rather than
/// returned, so delivered posts are still listed.

pub async fn drain(ctx: &AppContext) -> Result<DrainSummary> {
    execute_logged("posting::drain", || async {
        ctx.machine.drain(DrainTrigger::TimerTick).await.map(DrainSummary)
    })
    .await
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueListing {
    pub pending: Vec<QueuedPost>,
    pub failed: Vec<FailedPost>,
}

impl fmt::Display for QueueListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pending.is_empty() && self.failed.is_empty() {
            return write!(f, "Queue is empty");
        }
        for post in &self.pending {
            writeln!(
                f,
                "pending  {}  attempts={}  next={}  last_error={}  {:?}",
                post.id,
                post.attempt_count,
                post.next_retry_at.to_rfc3339(),
                post.last_error_kind,
                preview(&post.text)
            )?;
        }
        for failed in &self.failed {
            writeln!(
                f,
                "failed   {}  at={}  reason={}  {:?}",
                failed.post.id,
                failed.failed_at.to_rfc3339(),
                failed.reason,
                preview(&failed.post.text)
            )?;
        }
        Ok(())
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 40;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX).collect();
        format!("{head}...")
    }
}

/// List pending and terminally failed posts.
///
/// # Errors
/// Never fails today; kept fallible like the other commands.
pub async fn list_queue(ctx: &AppContext) -> Result<QueueListing> {
    execute_logged("posting::list_queue", || async {
        let queue = ctx.machine.queue();
        Ok(QueueListing { pending: queue.pending().await, failed: queue.failed().await })
    })
    .await
}

/// Drop terminally failed posts; returns how many were removed.
///
/// # Errors
/// `Storage` if the queue cannot be persisted.
pub async fn clear_failed(ctx: &AppContext) -> Result<usize> {
    execute_logged("posting::clear_failed", || async { ctx.machine.queue().clear_failed().await })
        .await
}
