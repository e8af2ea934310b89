//! Authentication state machine
//!
//! Single entry point for the commands a front end issues (authenticate,
//! retry, disconnect, post, refresh) and single owner of the externally
//! observable [`AuthenticationState`]. Every transition goes through
//! [`next_state`] and is published on the state feed in order.
//!
//! Posting runs rate-limit gating, token retrieval (publishing `Refreshing`
//! while a refresh is in flight) and the API call; retryable failures land in
//! the [`PostQueue`], which a background worker drains when its items come
//! due or a rate-limit window resets.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tern_common::auth::{BrowserLauncher, OAuthClientTrait, TokenManager};
use tern_common::{Clock, Feed, RateLimitDecision, RateLimitTracker, Subscription};
use tern_domain::constants::{
    DEFAULT_RATE_LIMIT_WINDOW_SECS, POSTS_ENDPOINT, RATE_LIMITED_MESSAGE, TOKEN_ENDPOINT,
    USERS_ME_ENDPOINT,
};
use tern_domain::{
    AuthenticationState, Config, DrainTrigger, PostFailureKind, PostOutcome, PostReceipt,
    QueuedPost, Result, TernError,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ports::{CallbackListener, CallbackListenerFactory};
use super::transitions::{next_state, AuthEvent};
use crate::posting::{
    validate_post_text, ApiResponse, DrainReport, Enqueued, PostDeliverer, PostQueue, PostingApi,
};

/// Shortest pause between background drain passes.
const MIN_WORKER_WAIT: Duration = Duration::from_millis(50);

/// Tunables for [`AuthenticationStateMachine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMachineSettings {
    pub scopes: Vec<String>,
    pub callback_timeout: Duration,
    /// Username fallback when the profile lookup fails.
    pub account_id: String,
    /// Upper bound on the pause between background drain passes.
    pub tick_interval: Duration,
}

impl From<&Config> for StateMachineSettings {
    fn from(config: &Config) -> Self {
        Self {
            scopes: config.oauth.scopes.clone(),
            callback_timeout: config.oauth.callback_timeout(),
            account_id: config.oauth.account_id.clone(),
            tick_interval: config.queue.tick_interval(),
        }
    }
}

/// Collaborators wired into the state machine.
pub struct AuthDependencies {
    pub oauth: Arc<dyn OAuthClientTrait>,
    pub tokens: Arc<TokenManager>,
    pub listeners: Arc<dyn CallbackListenerFactory>,
    pub browser: Arc<dyn BrowserLauncher>,
    pub api: Arc<dyn PostingApi>,
    pub rate_limits: Arc<RateLimitTracker>,
    pub queue: Arc<PostQueue>,
    pub clock: Arc<dyn Clock>,
}

struct Attempt {
    id: u64,
    cancel: CancellationToken,
    listener: Option<Arc<dyn CallbackListener>>,
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Whether a drain pass could deliver anything right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainGate {
    Open,
    /// Not authenticated; only a state change reopens it.
    Closed,
    /// Posting or the token refresh it needs is rate limited.
    Until(DateTime<Utc>),
}

struct Inner {
    settings: StateMachineSettings,
    oauth: Arc<dyn OAuthClientTrait>,
    tokens: Arc<TokenManager>,
    listeners: Arc<dyn CallbackListenerFactory>,
    browser: Arc<dyn BrowserLauncher>,
    api: Arc<dyn PostingApi>,
    rate_limits: Arc<RateLimitTracker>,
    queue: Arc<PostQueue>,
    clock: Arc<dyn Clock>,
    state: parking_lot::Mutex<AuthenticationState>,
    states: Feed<AuthenticationState>,
    username: parking_lot::Mutex<String>,
    attempt: parking_lot::Mutex<Option<Attempt>>,
    attempt_ids: AtomicU64,
    worker_passes: AtomicU64,
}

/// Aggregates the OAuth flow, token lifecycle, rate limiting and retry
/// queue behind one observable state.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct AuthenticationStateMachine {
    inner: Arc<Inner>,
    worker: Arc<parking_lot::Mutex<Option<Worker>>>,
}

impl std::fmt::Debug for AuthenticationStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationStateMachine")
            .field("state", &*self.inner.state.lock())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl AuthenticationStateMachine {
    pub fn new(deps: AuthDependencies, settings: StateMachineSettings) -> Self {
        let username = settings.account_id.clone();
        let inner = Inner {
            settings,
            oauth: deps.oauth,
            tokens: deps.tokens,
            listeners: deps.listeners,
            browser: deps.browser,
            api: deps.api,
            rate_limits: deps.rate_limits,
            queue: deps.queue,
            clock: deps.clock,
            state: parking_lot::Mutex::new(AuthenticationState::Disconnected),
            states: Feed::with_initial(AuthenticationState::Disconnected),
            username: parking_lot::Mutex::new(username),
            attempt: parking_lot::Mutex::new(None),
            attempt_ids: AtomicU64::new(0),
            worker_passes: AtomicU64::new(0),
        };
        Self { inner: Arc::new(inner), worker: Arc::new(parking_lot::Mutex::new(None)) }
    }

    #[must_use]
    pub fn state(&self) -> AuthenticationState {
        self.inner.state()
    }

    /// Subscribe to state changes. Only changes after this call are
    /// delivered; use [`state`](Self::state) for the current value.
    pub fn subscribe(&self) -> Subscription<AuthenticationState> {
        self.inner.states.subscribe()
    }

    #[must_use]
    pub fn state_feed(&self) -> Feed<AuthenticationState> {
        self.inner.states.clone()
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<PostQueue> {
        &self.inner.queue
    }

    #[must_use]
    pub fn rate_limits(&self) -> &Arc<RateLimitTracker> {
        &self.inner.rate_limits
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.inner.tokens
    }

    /// Run the authorization flow and return the authenticated username.
    ///
    /// An attempt already in flight is cancelled first.
    ///
    /// # Errors
    /// Any flow failure; the state moves to `Error` with its kind.
    pub async fn authenticate(&self) -> Result<String> {
        self.inner.authenticate().await
    }

    /// Re-run the authorization flow after a failure.
    ///
    /// # Errors
    /// `Internal` unless the current state is `Error`; otherwise as
    /// [`authenticate`](Self::authenticate).
    pub async fn retry(&self) -> Result<String> {
        if !matches!(self.state(), AuthenticationState::Error { .. }) {
            return Err(TernError::Internal(format!(
                "retry is only available from the error state (current: {})",
                self.state().label()
            )));
        }
        self.inner.authenticate().await
    }

    /// Cancel any attempt, wipe tokens and move to `Disconnected`.
    ///
    /// Queued posts are kept and re-attempted after reconnecting.
    ///
    /// # Errors
    /// Returns `Keychain` if the stored tokens could not be deleted; the
    /// state is `Disconnected` regardless.
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.disconnect().await
    }

    /// Validate and publish `text`, queueing it on retryable failure.
    ///
    /// # Errors
    /// - `InvalidTweetText` before any network call
    /// - `NotAuthenticated` unless authenticated; nothing is queued
    /// - non-retryable delivery failures
    /// - a retryable failure when the queue allows no retries; the post is
    ///   recorded in the failed set
    pub async fn post(&self, text: &str) -> Result<PostOutcome> {
        self.inner.post(text).await
    }

    /// Force a token refresh through the single-flight path.
    ///
    /// # Errors
    /// - `NotAuthenticated` unless authenticated
    /// - `RateLimitExceeded` while the token endpoint is throttled; no
    ///   request is made
    /// - otherwise the refresh failure
    pub async fn refresh(&self) -> Result<()> {
        if !self.state().can_post() {
            return Err(TernError::NotAuthenticated);
        }
        let inner = &self.inner;
        inner.refresh_tokens(inner.tokens.force_refresh()).await.map(|_| ())
    }

    /// Load the persisted queue and any stored tokens.
    ///
    /// With usable tokens the state becomes `Authenticated`.
    ///
    /// # Errors
    /// `Storage` or `Keychain` if persisted state cannot be read.
    pub async fn restore(&self) -> Result<AuthenticationState> {
        self.inner.restore().await
    }

    /// Drain due queue items now.
    ///
    /// Nothing is attempted while unauthenticated, while posting is rate
    /// limited, or while a due token refresh is. A store failure is reported
    /// in [`DrainReport::save_error`].
    pub async fn drain(&self, trigger: DrainTrigger) -> Result<DrainReport> {
        self.inner.drain(trigger).await
    }

    /// Number of passes the background drain worker has run.
    #[must_use]
    pub fn drain_worker_passes(&self) -> u64 {
        self.inner.worker_passes.load(Ordering::Relaxed)
    }

    /// Start the background drain worker. No-op if already running.
    pub fn start_drain_worker(&self) {
        let mut slot = self.worker.lock();
        if slot.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { inner.run_drain_worker(token).await });
        *slot = Some(Worker { cancel, handle });
    }

    /// Stop the drain worker and cancel any authorization attempt.
    pub async fn shutdown(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.cancel.cancel();
            if let Err(err) = worker.handle.await {
                error!(error = %err, "Queue drain worker terminated abnormally");
            }
        }
        self.inner.cancel_attempt().await;
    }
}

impl Inner {
    fn state(&self) -> AuthenticationState {
        self.state.lock().clone()
    }

    /// Apply `event`, surfacing an illegal transition as `Internal`.
    fn apply(&self, event: &AuthEvent) -> Result<AuthenticationState> {
        let mut state = self.state.lock();
        let Some(next) = next_state(&state, event) else {
            error!(state = state.label(), event = event.label(), "Illegal authentication state transition");
            return Err(TernError::Internal(format!(
                "illegal transition from {} on {}",
                state.label(),
                event.label()
            )));
        };

        if next != *state {
            info!(from = state.label(), to = next.label(), event = event.label(), "Authentication state changed");
            *state = next.clone();
            self.states.publish(next.clone());
        }
        Ok(next)
    }

    /// Apply `event` where the caller's own outcome takes precedence; an
    /// illegal transition is logged by [`apply`](Self::apply).
    fn record(&self, event: &AuthEvent) {
        if self.apply(event).is_err() {
            debug!(event = event.label(), "State left unchanged");
        }
    }

    async fn authenticate(&self) -> Result<String> {
        self.cancel_attempt().await;
        self.apply(&AuthEvent::Begin)?;

        let id = self.attempt_ids.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        *self.attempt.lock() = Some(Attempt { id, cancel: cancel.clone(), listener: None });

        let outcome = tokio::select! {
            () = cancel.cancelled() => Err(TernError::CallbackCancelled),
            result = self.run_flow(id) => result,
        };

        if !self.finish_attempt(id) {
            debug!(attempt = id, "Authorization attempt superseded");
            return Err(TernError::CallbackCancelled);
        }

        match outcome {
            Ok(username) => {
                username.clone_into(&mut self.username.lock());
                self.apply(&AuthEvent::Succeeded { username: username.clone() })?;
                if let Err(err) = self.drain(DrainTrigger::Reconnected).await {
                    error!(error = %err, "Queue drain after reconnect failed");
                }
                Ok(username)
            }
            Err(err) => {
                self.oauth.cancel_pending().await;
                warn!(error = %err, "Authorization attempt failed");
                self.record(&AuthEvent::Failed { kind: err.kind() });
                Err(err)
            }
        }
    }

    async fn run_flow(&self, id: u64) -> Result<String> {
        let listener = self.listeners.start().await?;
        if let Some(attempt) = self.attempt.lock().as_mut().filter(|attempt| attempt.id == id) {
            attempt.listener = Some(Arc::clone(&listener));
        }

        let redirect_uri = listener.redirect_uri();
        let url = self.oauth.start_authorization_flow(&self.settings.scopes, &redirect_uri).await?;
        self.open_browser(url).await?;
        info!(redirect_uri = %redirect_uri, "Waiting for OAuth callback");

        let callback = listener.wait_for_callback(self.settings.callback_timeout).await;
        listener.stop();
        let callback = callback?;

        if let Some(error) = &callback.error {
            warn!(
                error = %error,
                description = callback.error_description.as_deref().unwrap_or_default(),
                "Authorization denied at the callback"
            );
            return Err(TernError::AccessDenied);
        }
        let (Some(code), Some(state)) = (callback.code.as_deref(), callback.state.as_deref()) else {
            return Err(TernError::InvalidResponse(
                "callback is missing the code or state parameter".to_string(),
            ));
        };

        let tokens = self.oauth.exchange_code_for_token(code, state).await?;
        self.tokens.store(tokens).await?;
        Ok(self.fetch_username().await)
    }

    async fn open_browser(&self, url: String) -> Result<()> {
        let browser = Arc::clone(&self.browser);
        tokio::task::spawn_blocking(move || browser.open(&url))
            .await
            .map_err(|err| TernError::BrowserLaunchFailed(format!("browser launcher failed: {err}")))?
    }

    /// Drop the current attempt if it is still `id`. Returns whether it was.
    fn finish_attempt(&self, id: u64) -> bool {
        let mut slot = self.attempt.lock();
        if !slot.as_ref().is_some_and(|attempt| attempt.id == id) {
            return false;
        }
        if let Some(listener) = slot.take().and_then(|attempt| attempt.listener) {
            listener.stop();
        }
        true
    }

    async fn cancel_attempt(&self) {
        let previous = self.attempt.lock().take();
        let Some(attempt) = previous else {
            return;
        };

        info!(attempt = attempt.id, "Cancelling in-flight authorization attempt");
        attempt.cancel.cancel();
        if let Some(listener) = attempt.listener {
            listener.cancel();
            listener.stop();
        }
        self.oauth.cancel_pending().await;
    }

    async fn disconnect(&self) -> Result<()> {
        self.cancel_attempt().await;
        let cleared = self.tokens.clear().await;
        if let Err(err) = &cleared {
            error!(error = %err, "Failed to delete stored tokens on disconnect");
        }
        self.settings.account_id.clone_into(&mut self.username.lock());
        self.apply(&AuthEvent::Disconnect)?;
        cleared
    }

    async fn restore(&self) -> Result<AuthenticationState> {
        self.queue.load().await?;

        if self.tokens.initialize().await? {
            let username = self.fetch_username().await;
            if self.tokens.is_authenticated().await {
                username.clone_into(&mut self.username.lock());
                self.apply(&AuthEvent::Restored { username })?;
            } else {
                warn!("Stored authorization is no longer valid");
            }
        }
        Ok(self.state())
    }

    async fn fetch_username(&self) -> String {
        let profile = async {
            let token = self.tokens.current_access_token().await?;
            let response = self.api.current_user(&token).await;
            self.record_rate_limit(USERS_ME_ENDPOINT, &response);
            response.result
        }
        .await;

        match profile {
            Ok(profile) => profile.username,
            Err(err) => {
                warn!(error = %err, "Profile lookup failed; using the account id as username");
                self.settings.account_id.clone()
            }
        }
    }

    async fn post(&self, text: &str) -> Result<PostOutcome> {
        validate_post_text(text)?;
        if !self.state().can_post() {
            return Err(TernError::NotAuthenticated);
        }

        if let RateLimitDecision::WaitUntil { reset_at, .. } =
            self.rate_limits.check_before_call(POSTS_ENDPOINT)
        {
            let limited = TernError::RateLimitExceeded { reset_at };
            return self.queue_for_retry(text, limited, PostFailureKind::RateLimited).await;
        }

        match self.send_post(text).await {
            Ok(receipt) => {
                info!(tweet_id = %receipt.id, "Post delivered");
                Ok(PostOutcome::Delivered(receipt))
            }
            Err(err) => match err.post_failure_kind() {
                Some(kind) if kind.is_retryable() => self.queue_for_retry(text, err, kind).await,
                Some(PostFailureKind::AuthorizationRevoked) => {
                    self.revoke(&err).await;
                    Err(err)
                }
                Some(_) | None => Err(err),
            },
        }
    }

    /// Queue `text` after `err`. A post whose attempt budget is already
    /// spent is recorded as failed and `err` is returned.
    async fn queue_for_retry(
        &self,
        text: &str,
        err: TernError,
        kind: PostFailureKind,
    ) -> Result<PostOutcome> {
        let not_before = match &err {
            TernError::RateLimitExceeded { reset_at } => Some(*reset_at),
            _ => None,
        };
        match self.queue.enqueue_not_before(text, kind, not_before).await? {
            Enqueued::Pending(queued) => {
                info!(
                    post_id = %queued.id,
                    next_retry_at = %queued.next_retry_at,
                    error = %err,
                    "Post queued for retry"
                );
                Ok(PostOutcome::Queued { id: queued.id, kind })
            }
            Enqueued::Exhausted(failed) => {
                warn!(post_id = %failed.post.id, error = %err, "Post failed and no retries are allowed");
                Err(err)
            }
        }
    }

    /// One delivery attempt, retried once after a forced refresh when the
    /// API rejects the access token.
    async fn send_post(&self, text: &str) -> Result<PostReceipt> {
        let token = self.access_token().await?;
        let response = self.api.create_post(&token, text).await;
        self.record_rate_limit(POSTS_ENDPOINT, &response);

        match response.result {
            Err(TernError::AccessDenied) => {
                debug!("Access token rejected by the API; forcing refresh");
                let refreshed = self.refresh_tokens(self.tokens.force_refresh()).await?;
                let retry = self.api.create_post(&refreshed.access_token, text).await;
                self.record_rate_limit(POSTS_ENDPOINT, &retry);
                retry.result.map_err(|err| match err {
                    TernError::AccessDenied => TernError::AuthorizationRevoked,
                    other => other,
                })
            }
            other => other,
        }
    }

    async fn access_token(&self) -> Result<String> {
        if self.tokens.needs_refresh().await {
            self.refresh_tokens(self.tokens.current_access_token()).await
        } else {
            self.tokens.current_access_token().await
        }
    }

    /// Run a refresh unless the token endpoint is throttled.
    ///
    /// Both a closed window and a throttled response come back as
    /// `RateLimitExceeded` with the endpoint's reset time.
    async fn refresh_tokens<T>(&self, refresh: impl Future<Output = Result<T>>) -> Result<T> {
        if let RateLimitDecision::WaitUntil { reset_at, .. } =
            self.rate_limits.check_before_call(TOKEN_ENDPOINT)
        {
            debug!(reset_at = %reset_at, "Token endpoint rate limited; refresh not attempted");
            return Err(TernError::RateLimitExceeded { reset_at });
        }
        self.refresh_with_state(refresh).await.map_err(|err| self.throttled_refresh(err))
    }

    /// Map a throttled refresh onto the token endpoint's window, opening a
    /// default-length one when the response carried no reset time.
    fn throttled_refresh(&self, err: TernError) -> TernError {
        if !matches!(&err, TernError::ServerError { message } if message == RATE_LIMITED_MESSAGE) {
            return err;
        }
        let reset_at = match self.rate_limits.check_before_call(TOKEN_ENDPOINT) {
            RateLimitDecision::WaitUntil { reset_at, .. } => reset_at,
            RateLimitDecision::Proceed => {
                let reset_at =
                    self.clock.now() + ChronoDuration::seconds(DEFAULT_RATE_LIMIT_WINDOW_SECS);
                self.rate_limits.record_exhausted(TOKEN_ENDPOINT, reset_at);
                reset_at
            }
        };
        TernError::RateLimitExceeded { reset_at }
    }

    /// Run `refresh` while publishing `Refreshing`.
    ///
    /// A transient failure returns to `Authenticated`; one that ends the
    /// grant moves to `Error`.
    async fn refresh_with_state<T>(&self, refresh: impl Future<Output = Result<T>>) -> Result<T> {
        self.record(&AuthEvent::RefreshStarted);
        let result = refresh.await;

        match &result {
            Err(err) if err.requires_reauthentication() => {
                self.record(&AuthEvent::Failed { kind: err.kind() });
            }
            Ok(_) | Err(_) => {
                if let Err(err) = &result {
                    warn!(error = %err, "Token refresh failed; keeping the session");
                }
                let username = self.username.lock().clone();
                self.record(&AuthEvent::RefreshCompleted { username });
            }
        }
        result
    }

    /// End the session after the server rejected the grant.
    async fn revoke(&self, err: &TernError) {
        if let Err(clear_err) = self.tokens.clear().await {
            error!(error = %clear_err, "Failed to delete revoked tokens");
        }
        if self.state().can_post() {
            self.record(&AuthEvent::Failed { kind: err.kind() });
        }
    }

    fn record_rate_limit<T>(&self, endpoint: &str, response: &ApiResponse<T>) {
        match (&response.rate_limit, &response.result) {
            (Some(snapshot), _) => {
                self.rate_limits.record_snapshot(endpoint, snapshot.clone());
            }
            (None, Err(TernError::RateLimitExceeded { reset_at })) => {
                self.rate_limits.record_exhausted(endpoint, *reset_at);
            }
            (None, _) => {}
        }
    }

    /// Posting needs a session, an open posts window and, when the token is
    /// about to expire, an open token window.
    async fn drain_gate(&self) -> DrainGate {
        if !self.state().can_post() {
            return DrainGate::Closed;
        }
        if let RateLimitDecision::WaitUntil { reset_at, .. } =
            self.rate_limits.check_before_call(POSTS_ENDPOINT)
        {
            return DrainGate::Until(reset_at);
        }
        if self.tokens.needs_refresh().await {
            if let RateLimitDecision::WaitUntil { reset_at, .. } =
                self.rate_limits.check_before_call(TOKEN_ENDPOINT)
            {
                return DrainGate::Until(reset_at);
            }
        }
        DrainGate::Open
    }

    async fn drain(&self, trigger: DrainTrigger) -> Result<DrainReport> {
        match self.drain_gate().await {
            DrainGate::Open => self.queue.drain(trigger, self).await,
            DrainGate::Closed => {
                debug!(trigger = %trigger, "Skipping queue drain while not authenticated");
                Ok(DrainReport::empty(trigger))
            }
            DrainGate::Until(reset_at) => {
                debug!(trigger = %trigger, reset_at = %reset_at, "Skipping queue drain while rate limited");
                Ok(DrainReport::empty(trigger))
            }
        }
    }

    async fn run_drain_worker(self: Arc<Self>, cancel: CancellationToken) {
        info!(tick = ?self.settings.tick_interval, "Queue drain worker started");
        let mut states = self.states.subscribe();
        let mut stalled = false;
        loop {
            let wait = self.worker_wait(stalled).await;
            tokio::select! {
                () = cancel.cancelled() => break,
                Some(state) = states.recv() => {
                    debug!(state = state.label(), "Drain worker woken by state change");
                }
                () = tokio::time::sleep(wait) => {}
            }

            self.worker_passes.fetch_add(1, Ordering::Relaxed);
            let trigger = if self.rate_limits.take_reset_windows().is_empty() {
                DrainTrigger::TimerTick
            } else {
                DrainTrigger::RateLimitWindowReset
            };
            stalled = match self.drain(trigger).await {
                Ok(report) => report.deferred > 0 || report.save_error.is_some(),
                Err(err) => {
                    error!(error = %err, trigger = %trigger, "Background queue drain failed");
                    true
                }
            };
            // Refresh or revocation during the pass publishes its own states.
            states.drain();
        }
        info!("Queue drain worker stopped");
    }

    /// Pause before the next background pass.
    ///
    /// While the gate is shut the worker sleeps until it lifts (a rate-limit
    /// reset, or a state change for `Closed`); a pass that left due items
    /// behind waits a full tick. Otherwise it wakes for the next due item or
    /// window reset. Always capped by the tick interval.
    async fn worker_wait(&self, stalled: bool) -> Duration {
        let tick = self.settings.tick_interval;
        let wake_at = match self.drain_gate().await {
            DrainGate::Closed => return tick,
            DrainGate::Until(reset_at) => Some(reset_at),
            DrainGate::Open if stalled => return tick,
            DrainGate::Open => {
                [self.queue.next_retry_at().await, self.rate_limits.next_reset_at()]
                    .into_iter()
                    .flatten()
                    .min()
            }
        };

        let now = self.clock.now();
        let until = wake_at.map_or(tick, |at| (at - now).to_std().unwrap_or(Duration::ZERO));
        until.min(tick).max(MIN_WORKER_WAIT)
    }
}

#[async_trait]
impl PostDeliverer for Inner {
    async fn deliver(&self, post: &QueuedPost) -> Result<PostReceipt> {
        match self.drain_gate().await {
            DrainGate::Open => {}
            DrainGate::Closed => return Err(TernError::NotAuthenticated),
            DrainGate::Until(reset_at) => return Err(TernError::RateLimitExceeded { reset_at }),
        }

        match self.send_post(&post.text).await {
            // The post stays queued for the next session.
            Err(err) if err.post_failure_kind() == Some(PostFailureKind::AuthorizationRevoked) => {
                self.revoke(&err).await;
                Err(TernError::NotAuthenticated)
            }
            other => other,
        }
    }
}
