//! Durable retry queue for posts that could not be delivered immediately
//!
//! Only retryable failure classes (network, rate limit, transient server)
//! are queued. Each item is re-attempted with bounded exponential backoff
//! until it is delivered or runs out of attempts, at which point it moves to
//! the terminal failed set.
//!
//! Every mutation is written through the [`QueueStore`] and announced on the
//! queue-status feed. Enqueue and `clear_failed` only change the in-memory
//! queue once the store accepted the new snapshot.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use tern_common::{Clock, ExponentialBackoff, Feed, Subscription};
use tern_domain::{
    DrainTrigger, FailedPost, PostFailureKind, PostReceipt, QueueConfig, QueueSnapshot,
    QueueStatus, QueuedPost, Result, TernError,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::ports::{PostDeliverer, QueueStore};

/// Summary of one drain pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub trigger: DrainTrigger,
    pub delivered: Vec<PostReceipt>,
    pub rescheduled: Vec<Uuid>,
    pub failed: Vec<Uuid>,
    /// Due items left untouched because delivery is currently impossible
    /// (e.g. no longer authenticated).
    pub deferred: usize,
    /// Set when the store rejected a snapshot and the pass stopped early.
    /// The in-memory queue still reflects every attempt listed above.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_error: Option<String>,
}

impl DrainReport {
    /// A pass that attempted nothing.
    #[must_use]
    pub fn empty(trigger: DrainTrigger) -> Self {
        Self {
            trigger,
            delivered: Vec::new(),
            rescheduled: Vec::new(),
            failed: Vec::new(),
            deferred: 0,
            save_error: None,
        }
    }

    #[must_use]
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.rescheduled.len() + self.failed.len()
    }
}

/// Where a newly enqueued post ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    /// Waiting for a retry at `next_retry_at`.
    Pending(QueuedPost),
    /// The attempt budget allowed no retry; the post went straight to the
    /// failed set.
    Exhausted(FailedPost),
}

impl Enqueued {
    #[must_use]
    pub fn post(&self) -> &QueuedPost {
        match self {
            Self::Pending(post) => post,
            Self::Exhausted(failed) => &failed.post,
        }
    }
}

/// FIFO retry queue ordered by `(next_retry_at, created_at)`.
pub struct PostQueue {
    state: Mutex<QueueSnapshot>,
    drain_lock: Mutex<()>,
    store: Arc<dyn QueueStore>,
    backoff: ExponentialBackoff,
    max_attempts: u32,
    clock: Arc<dyn Clock>,
    status: Feed<QueueStatus>,
}

impl std::fmt::Debug for PostQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostQueue")
            .field("backoff", &self.backoff)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl PostQueue {
    pub fn new(store: Arc<dyn QueueStore>, config: &QueueConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(QueueSnapshot::default()),
            drain_lock: Mutex::new(()),
            store,
            backoff: ExponentialBackoff::from(config),
            max_attempts: config.max_attempts.max(1),
            clock,
            status: Feed::with_initial(QueueStatus::default()),
        }
    }

    /// Replace the backoff policy derived from the queue settings.
    #[must_use]
    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Queue-status feed; every mutation publishes the new counters.
    #[must_use]
    pub fn feed(&self) -> Feed<QueueStatus> {
        self.status.clone()
    }

    pub fn subscribe(&self) -> Subscription<QueueStatus> {
        self.status.subscribe()
    }

    /// Queue `text` after a failed delivery attempt of class `kind`.
    ///
    /// The first attempt counts against `max_attempts`, so with a budget of
    /// one the post is recorded as [`Enqueued::Exhausted`] instead.
    ///
    /// # Errors
    /// - `InvalidTweetText` / `AuthorizationRevoked` when `kind` is not
    ///   retryable; nothing is queued
    /// - `Storage` if the queue cannot be persisted; the queue is unchanged
    pub async fn enqueue(&self, text: impl Into<String>, kind: PostFailureKind) -> Result<Enqueued> {
        self.enqueue_not_before(text, kind, None).await
    }

    /// Like [`enqueue`](Self::enqueue), but never schedule the first retry
    /// before `not_before` (e.g. a known rate-limit reset).
    ///
    /// # Errors
    /// Same as [`enqueue`](Self::enqueue).
    pub async fn enqueue_not_before(
        &self,
        text: impl Into<String>,
        kind: PostFailureKind,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<Enqueued> {
        if !kind.is_retryable() {
            return Err(non_retryable_error(kind));
        }

        let now = self.clock.now();
        let post = QueuedPost {
            id: Uuid::new_v4(),
            text: text.into(),
            created_at: now,
            attempt_count: 1,
            last_error_kind: kind,
            next_retry_at: self.retry_time(1, now, None, not_before),
        };

        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let enqueued = if post.attempt_count >= self.max_attempts {
            let failed = FailedPost { reason: exhausted_reason(&post), post, failed_at: now };
            next.failed.push(failed.clone());
            Enqueued::Exhausted(failed)
        } else {
            next.pending.push(post.clone());
            Enqueued::Pending(post)
        };
        self.commit(&next).await?;
        *state = next;

        match &enqueued {
            Enqueued::Pending(post) => info!(
                post_id = %post.id,
                kind = %kind,
                next_retry_at = %post.next_retry_at,
                "Post queued for retry"
            ),
            Enqueued::Exhausted(failed) => {
                warn!(post_id = %failed.post.id, kind = %kind, "Post failed with no retries allowed");
            }
        }
        Ok(enqueued)
    }

    /// Attempt every item whose `next_retry_at` has passed.
    ///
    /// Drains are serialized: a concurrent call waits for the running pass
    /// and then only sees what is still due.
    ///
    /// An attempt has already happened by the time its result is saved, so a
    /// store failure keeps the in-memory outcome (a delivered post is never
    /// retried), stops the pass and is reported in
    /// [`DrainReport::save_error`]. The next successful save writes it out.
    pub async fn drain(
        &self,
        trigger: DrainTrigger,
        deliverer: &dyn PostDeliverer,
    ) -> Result<DrainReport> {
        let _serialized = self.drain_lock.lock().await;
        let mut report = DrainReport::empty(trigger);

        let due = {
            let state = self.state.lock().await;
            let now = self.clock.now();
            let mut due: Vec<QueuedPost> =
                state.pending.iter().filter(|post| post.next_retry_at <= now).cloned().collect();
            due.sort_by_key(|post| (post.next_retry_at, post.created_at));
            due
        };
        if due.is_empty() {
            debug!(trigger = %trigger, "Queue drain found nothing due");
            return Ok(report);
        }
        debug!(trigger = %trigger, due = due.len(), "Draining post queue");

        for (index, post) in due.iter().enumerate() {
            let outcome = deliverer.deliver(post).await;

            let mut state = self.state.lock().await;
            let Some(position) = state.pending.iter().position(|queued| queued.id == post.id)
            else {
                continue;
            };

            match outcome {
                Ok(receipt) => {
                    state.pending.remove(position);
                    info!(post_id = %post.id, tweet_id = %receipt.id, "Queued post delivered");
                    report.delivered.push(receipt);
                }
                Err(err) => match err.post_failure_kind() {
                    Some(kind) if kind.is_retryable() => {
                        let not_before = match &err {
                            TernError::RateLimitExceeded { reset_at } => Some(*reset_at),
                            _ => None,
                        };
                        if self.reschedule(&mut state, position, kind, not_before) {
                            report.rescheduled.push(post.id);
                        } else {
                            report.failed.push(post.id);
                        }
                    }
                    Some(kind) => {
                        let mut failed = state.pending.remove(position);
                        failed.last_error_kind = kind;
                        warn!(post_id = %failed.id, kind = %kind, error = %err, "Queued post rejected");
                        state.failed.push(FailedPost {
                            post: failed,
                            failed_at: self.clock.now(),
                            reason: err.to_string(),
                        });
                        report.failed.push(post.id);
                    }
                    None => {
                        report.deferred = due.len() - index;
                        debug!(error = %err, deferred = report.deferred, "Delivery unavailable; deferring drain");
                        break;
                    }
                },
            }
            if let Err(err) = self.commit(&state).await {
                report.deferred = due.len() - index - 1;
                error!(
                    post_id = %post.id,
                    error = %err,
                    deferred = report.deferred,
                    "Could not persist the post queue; stopping drain"
                );
                report.save_error = Some(err.to_string());
                break;
            }
        }

        info!(
            trigger = %trigger,
            delivered = report.delivered.len(),
            rescheduled = report.rescheduled.len(),
            failed = report.failed.len(),
            deferred = report.deferred,
            "Queue drain complete"
        );
        Ok(report)
    }

    /// Restore persisted items, keeping anything already queued in memory.
    ///
    /// Returns the number of pending items after the merge.
    ///
    /// # Errors
    /// Returns `Storage` if the store cannot be read.
    pub async fn load(&self) -> Result<usize> {
        let persisted = self.store.load().await?;
        let mut state = self.state.lock().await;

        for post in persisted.pending {
            if !state.pending.iter().any(|queued| queued.id == post.id) {
                state.pending.push(post);
            }
        }
        for failed in persisted.failed {
            if !state.failed.iter().any(|known| known.post.id == failed.post.id) {
                state.failed.push(failed);
            }
        }

        info!(pending = state.pending.len(), failed = state.failed.len(), "Post queue restored");
        self.status.publish(status_of(&state));
        Ok(state.pending.len())
    }

    /// Drop the terminal failed set. Returns how many entries were removed.
    ///
    /// # Errors
    /// Returns `Storage` if the queue cannot be persisted.
    pub async fn clear_failed(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let removed = state.failed.len();
        let next = QueueSnapshot { pending: state.pending.clone(), failed: Vec::new() };
        self.commit(&next).await?;
        *state = next;
        Ok(removed)
    }

    pub async fn status(&self) -> QueueStatus {
        status_of(&*self.state.lock().await)
    }

    /// Pending items in drain order.
    pub async fn pending(&self) -> Vec<QueuedPost> {
        let mut pending = self.state.lock().await.pending.clone();
        pending.sort_by_key(|post| (post.next_retry_at, post.created_at));
        pending
    }

    pub async fn failed(&self) -> Vec<FailedPost> {
        self.state.lock().await.failed.clone()
    }

    pub async fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.pending.iter().map(|post| post.next_retry_at).min()
    }

    /// Record a failed attempt for `state.pending[position]`.
    ///
    /// Returns `false` when the item ran out of attempts and moved to the
    /// failed set.
    fn reschedule(
        &self,
        state: &mut QueueSnapshot,
        position: usize,
        kind: PostFailureKind,
        not_before: Option<DateTime<Utc>>,
    ) -> bool {
        let now = self.clock.now();
        let entry = &mut state.pending[position];
        entry.attempt_count = entry.attempt_count.saturating_add(1);
        entry.last_error_kind = kind;

        if entry.attempt_count < self.max_attempts {
            entry.next_retry_at =
                self.retry_time(entry.attempt_count, now, Some(entry.next_retry_at), not_before);
            debug!(
                post_id = %entry.id,
                attempt = entry.attempt_count,
                next_retry_at = %entry.next_retry_at,
                "Queued post rescheduled"
            );
            return true;
        }

        let post = state.pending.remove(position);
        warn!(
            post_id = %post.id,
            attempts = post.attempt_count,
            kind = %kind,
            "Queued post exhausted its attempts"
        );
        let reason = exhausted_reason(&post);
        state.failed.push(FailedPost { post, failed_at: now, reason });
        false
    }

    /// `now + backoff(attempt)`, kept strictly after `previous` and no
    /// earlier than `not_before`.
    fn retry_time(
        &self,
        attempt: u32,
        now: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
        not_before: Option<DateTime<Utc>>,
    ) -> DateTime<Utc> {
        let delay = ChronoDuration::from_std(self.backoff.delay(attempt))
            .unwrap_or_else(|_| ChronoDuration::seconds(i64::from(u32::MAX)));
        let mut at = now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC);
        if let Some(previous) = previous {
            at = at.max(previous + ChronoDuration::milliseconds(1));
        }
        if let Some(not_before) = not_before {
            at = at.max(not_before);
        }
        at
    }

    async fn commit(&self, state: &QueueSnapshot) -> Result<()> {
        self.store.save(state).await?;
        self.status.publish(status_of(state));
        Ok(())
    }
}

fn status_of(state: &QueueSnapshot) -> QueueStatus {
    QueueStatus {
        pending: state.pending.len(),
        failed: state.failed.len(),
        next_retry_at: state.pending.iter().map(|post| post.next_retry_at).min(),
    }
}

fn exhausted_reason(post: &QueuedPost) -> String {
    format!("gave up after {} attempts (last failure: {})", post.attempt_count, post.last_error_kind)
}

fn non_retryable_error(kind: PostFailureKind) -> TernError {
    match kind {
        PostFailureKind::InvalidContent => TernError::InvalidTweetText {
            reason: "rejected by the server".to_string(),
        },
        PostFailureKind::AuthorizationRevoked => TernError::AuthorizationRevoked,
        PostFailureKind::Network | PostFailureKind::RateLimited | PostFailureKind::TransientServer => {
            TernError::Internal(format!("{kind} failures are retryable"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tern_common::{Jitter, MockClock};

    use super::*;

    #[derive(Default)]
    struct MemoryStore {
        saved: parking_lot::Mutex<QueueSnapshot>,
        saves: AtomicUsize,
        fail_saves: AtomicBool,
    }

    #[async_trait]
    impl QueueStore for MemoryStore {
        async fn load(&self) -> Result<QueueSnapshot> {
            Ok(self.saved.lock().clone())
        }

        async fn save(&self, snapshot: &QueueSnapshot) -> Result<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(TernError::Storage("disk full".into()));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.saved.lock() = snapshot.clone();
            Ok(())
        }
    }

    #[derive(Default)]
    struct ScriptedDeliverer {
        results: parking_lot::Mutex<VecDeque<Result<PostReceipt>>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl ScriptedDeliverer {
        fn with(results: Vec<Result<PostReceipt>>) -> Self {
            Self { results: parking_lot::Mutex::new(results.into()), ..Self::default() }
        }
    }

    #[async_trait]
    impl PostDeliverer for ScriptedDeliverer {
        async fn deliver(&self, post: &QueuedPost) -> Result<PostReceipt> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.results.lock().pop_front().unwrap_or_else(|| {
                Ok(PostReceipt { id: format!("tweet-{}", post.id), text: post.text.clone() })
            })
        }
    }

    fn queue(max_attempts: u32) -> (PostQueue, Arc<MemoryStore>, MockClock) {
        let store = Arc::new(MemoryStore::default());
        let clock = MockClock::new();
        let config = QueueConfig { max_attempts, ..QueueConfig::default() };
        let queue = PostQueue::new(store.clone(), &config, Arc::new(clock.clone())).with_backoff(
            ExponentialBackoff::new(Duration::from_secs(2), Duration::from_secs(60))
                .with_jitter(Jitter::None),
        );
        (queue, store, clock)
    }

    fn network_error() -> TernError {
        TernError::NetworkError("connection reset".into())
    }

    #[tokio::test]
    async fn rejects_non_retryable_kinds() {
        let (queue, store, _) = queue(5);

        assert!(matches!(
            queue.enqueue("hello", PostFailureKind::InvalidContent).await,
            Err(TernError::InvalidTweetText { .. })
        ));
        assert_eq!(
            queue.enqueue("hello", PostFailureKind::AuthorizationRevoked).await,
            Err(TernError::AuthorizationRevoked)
        );
        assert_eq!(queue.status().await, QueueStatus::default());
        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn enqueue_schedules_first_retry_and_persists() {
        let (queue, store, clock) = queue(5);
        let mut status = queue.subscribe();

        let post = queue.enqueue("hello", PostFailureKind::Network).await.unwrap().post().clone();
        assert_eq!(post.attempt_count, 1);
        assert_eq!(post.next_retry_at, clock.now() + ChronoDuration::seconds(2));

        assert_eq!(store.saved.lock().pending, vec![post.clone()]);
        let published = status.drain();
        assert_eq!(published.last().map(|s| s.pending), Some(1));
        assert_eq!(queue.next_retry_at().await, Some(post.next_retry_at));
    }

    /// Validates retry scheduling until the attempt budget runs out.
    ///
    /// Assertions:
    /// - `next_retry_at` strictly increases on every failed attempt.
    /// - Items are not attempted before they are due.
    /// - After `max_attempts` failures the item is terminal and not retried.
    #[tokio::test]
    async fn backoff_grows_until_terminal() {
        let (queue, _, clock) = queue(4);
        let post =
            queue.enqueue("hello", PostFailureKind::TransientServer).await.unwrap().post().clone();
        let deliverer = ScriptedDeliverer::with((0..10).map(|_| Err(network_error())).collect());

        let early = queue.drain(DrainTrigger::TimerTick, &deliverer).await.unwrap();
        assert_eq!(early.attempted(), 0);

        let mut previous = post.next_retry_at;
        for expected_attempt in 2..4 {
            clock.set(previous);
            let report = queue.drain(DrainTrigger::TimerTick, &deliverer).await.unwrap();
            assert_eq!(report.rescheduled, vec![post.id]);

            let pending = queue.pending().await;
            assert_eq!(pending[0].attempt_count, expected_attempt);
            assert_eq!(pending[0].last_error_kind, PostFailureKind::Network);
            assert!(pending[0].next_retry_at > previous);
            previous = pending[0].next_retry_at;
        }

        clock.set(previous);
        let report = queue.drain(DrainTrigger::TimerTick, &deliverer).await.unwrap();
        assert_eq!(report.failed, vec![post.id]);
        assert!(queue.pending().await.is_empty());
        assert_eq!(queue.failed().await[0].post.attempt_count, 4);

        clock.advance(ChronoDuration::hours(1));
        let report = queue.drain(DrainTrigger::TimerTick, &deliverer).await.unwrap();
        assert_eq!(report.attempted(), 0);
        assert_eq!(deliverer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn delivers_after_one_network_retry() {
        let (queue, _, clock) = queue(5);
        queue.enqueue("first", PostFailureKind::Network).await.unwrap();
        let deliverer = ScriptedDeliverer::with(vec![Err(network_error())]);

        clock.advance(ChronoDuration::seconds(2));
        let report = queue.drain(DrainTrigger::TimerTick, &deliverer).await.unwrap();
        assert_eq!(report.rescheduled.len(), 1);

        clock.advance(ChronoDuration::seconds(4));
        let report = queue.drain(DrainTrigger::Reconnected, &deliverer).await.unwrap();
        assert_eq!(report.delivered.len(), 1);
        assert_eq!(report.delivered[0].text, "first");
        assert_eq!(queue.status().await, QueueStatus::default());
    }

    #[tokio::test]
    async fn rate_limit_reset_bounds_next_retry() {
        let (queue, _, clock) = queue(5);
        let reset_at = clock.now() + ChronoDuration::minutes(15);

        let post = queue
            .enqueue_not_before("hello", PostFailureKind::RateLimited, Some(reset_at))
            .await
            .unwrap();
        assert_eq!(post.post().next_retry_at, reset_at);

        clock.set(reset_at);
        let later = reset_at + ChronoDuration::minutes(15);
        let deliverer =
            ScriptedDeliverer::with(vec![Err(TernError::RateLimitExceeded { reset_at: later })]);
        queue.drain(DrainTrigger::RateLimitWindowReset, &deliverer).await.unwrap();
        assert_eq!(queue.pending().await[0].next_retry_at, later);
    }

    #[tokio::test]
    async fn non_retryable_drain_failure_is_terminal() {
        let (queue, _, clock) = queue(5);
        queue.enqueue("hello", PostFailureKind::Network).await.unwrap();
        let deliverer = ScriptedDeliverer::with(vec![Err(TernError::InvalidTweetText {
            reason: "duplicate content".into(),
        })]);

        clock.advance(ChronoDuration::seconds(2));
        let report = queue.drain(DrainTrigger::TimerTick, &deliverer).await.unwrap();
        assert_eq!(report.failed.len(), 1);

        let failed = queue.failed().await;
        assert_eq!(failed[0].post.last_error_kind, PostFailureKind::InvalidContent);
        assert!(failed[0].reason.contains("duplicate content"));
        assert_eq!(queue.clear_failed().await.unwrap(), 1);
        assert!(queue.failed().await.is_empty());
    }

    #[tokio::test]
    async fn unclassified_failure_defers_remaining_items() {
        let (queue, _, clock) = queue(5);
        queue.enqueue("one", PostFailureKind::Network).await.unwrap();
        queue.enqueue("two", PostFailureKind::Network).await.unwrap();
        let deliverer = ScriptedDeliverer::with(vec![Err(TernError::NotAuthenticated)]);

        clock.advance(ChronoDuration::seconds(2));
        let report = queue.drain(DrainTrigger::TimerTick, &deliverer).await.unwrap();
        assert_eq!(report.deferred, 2);
        assert_eq!(report.attempted(), 0);
        assert!(queue.pending().await.iter().all(|post| post.attempt_count == 1));
        assert_eq!(deliverer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drains_in_retry_order() {
        let (queue, _, clock) = queue(5);
        queue.enqueue("older", PostFailureKind::Network).await.unwrap();
        clock.advance(ChronoDuration::milliseconds(10));
        queue.enqueue("newer", PostFailureKind::Network).await.unwrap();

        clock.advance(ChronoDuration::seconds(5));
        let report = queue
            .drain(DrainTrigger::TimerTick, &ScriptedDeliverer::default())
            .await
            .unwrap();
        let texts: Vec<_> = report.delivered.iter().map(|receipt| receipt.text.as_str()).collect();
        assert_eq!(texts, ["older", "newer"]);
    }

    #[tokio::test]
    async fn concurrent_drains_attempt_each_item_once() {
        let (queue, _, clock) = queue(5);
        queue.enqueue("hello", PostFailureKind::Network).await.unwrap();
        clock.advance(ChronoDuration::seconds(2));

        let queue = Arc::new(queue);
        let deliverer = Arc::new(ScriptedDeliverer {
            delay: Some(Duration::from_millis(50)),
            ..ScriptedDeliverer::default()
        });

        let first = {
            let (queue, deliverer) = (Arc::clone(&queue), Arc::clone(&deliverer));
            tokio::spawn(async move {
                queue.drain(DrainTrigger::TimerTick, deliverer.as_ref()).await
            })
        };
        let second = {
            let (queue, deliverer) = (Arc::clone(&queue), Arc::clone(&deliverer));
            tokio::spawn(async move {
                queue.drain(DrainTrigger::Reconnected, deliverer.as_ref()).await
            })
        };

        let delivered = first.await.unwrap().unwrap().delivered.len()
            + second.await.unwrap().unwrap().delivered.len();
        assert_eq!(delivered, 1);
        assert_eq!(deliverer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn load_merges_persisted_items() {
        let (queue, store, _) = queue(5);
        let persisted = queue.enqueue("persisted", PostFailureKind::Network).await.unwrap();
        let persisted = persisted.post().clone();

        let restored = PostQueue::new(
            store.clone(),
            &QueueConfig::default(),
            Arc::new(MockClock::new()),
        );
        assert_eq!(restored.load().await.unwrap(), 1);
        assert_eq!(restored.load().await.unwrap(), 1);
        assert_eq!(restored.pending().await, vec![persisted]);
        assert_eq!(restored.feed().latest().map(|s| s.pending), Some(1));
    }

    #[tokio::test]
    async fn single_attempt_budget_fails_immediately() {
        let (queue, store, _) = queue(1);
        let enqueued = queue.enqueue("hello", PostFailureKind::Network).await.unwrap();

        let Enqueued::Exhausted(failed) = enqueued else {
            panic!("expected an exhausted post, got {enqueued:?}");
        };
        assert_eq!(failed.post.text, "hello");
        assert!(failed.reason.contains("gave up after 1 attempts"));

        let status = queue.status().await;
        assert_eq!((status.pending, status.failed), (0, 1));
        assert_eq!(store.saved.lock().failed, vec![failed]);
    }

    #[tokio::test]
    async fn failed_save_leaves_queue_unchanged() {
        let (queue, store, _) = queue(5);
        let mut status = queue.subscribe();
        store.fail_saves.store(true, Ordering::SeqCst);

        let result = queue.enqueue("hello", PostFailureKind::Network).await;
        assert_eq!(result, Err(TernError::Storage("disk full".into())));
        assert!(queue.pending().await.is_empty());
        assert_eq!(queue.status().await, QueueStatus::default());
        assert!(status.drain().iter().all(|published| published.pending == 0));

        store.fail_saves.store(false, Ordering::SeqCst);
        queue.enqueue("hello", PostFailureKind::Network).await.unwrap();
        assert_eq!(queue.pending().await.len(), 1);
        assert_eq!(store.saved.lock().pending.len(), 1);
    }

    #[tokio::test]
    async fn failed_clear_keeps_failed_posts() {
        let (queue, store, _) = queue(1);
        queue.enqueue("hello", PostFailureKind::Network).await.unwrap();
        store.fail_saves.store(true, Ordering::SeqCst);

        assert!(matches!(queue.clear_failed().await, Err(TernError::Storage(_))));
        assert_eq!(queue.failed().await.len(), 1);
    }

    /// Validates a drain pass whose snapshot cannot be saved.
    ///
    /// Assertions:
    /// - The delivery receipt is still reported.
    /// - The delivered post is not retried by a later pass.
    /// - The remaining due items are deferred untouched.
    #[tokio::test]
    async fn save_failure_during_drain_keeps_receipts() {
        let (queue, store, clock) = queue(5);
        queue.enqueue("one", PostFailureKind::Network).await.unwrap();
        queue.enqueue("two", PostFailureKind::Network).await.unwrap();
        clock.advance(ChronoDuration::seconds(2));
        store.fail_saves.store(true, Ordering::SeqCst);

        let deliverer = ScriptedDeliverer::default();
        let report = queue.drain(DrainTrigger::TimerTick, &deliverer).await.unwrap();
        assert_eq!(report.delivered.len(), 1);
        assert_eq!(report.deferred, 1);
        assert_eq!(report.save_error.as_deref(), Some("Storage error: disk full"));
        assert_eq!(queue.pending().await.len(), 1);

        store.fail_saves.store(false, Ordering::SeqCst);
        let report = queue.drain(DrainTrigger::TimerTick, &deliverer).await.unwrap();
        assert_eq!(report.delivered.len(), 1);
        assert_eq!(report.delivered[0].text, "two");
        assert!(report.save_error.is_none());
        assert_eq!(deliverer.calls.load(Ordering::SeqCst), 2);
        assert!(store.saved.lock().pending.is_empty());
    }
}
