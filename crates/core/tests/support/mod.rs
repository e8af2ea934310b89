//! Shared test helpers for `tern-core` integration tests.
//!
//! Scripted doubles for the core ports plus a [`Harness`] that wires a
//! complete state machine around them.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tern_common::auth::TokenManager;
use tern_common::testing::{MockBrowserLauncher, MockClock, MockKeychainProvider, MockOAuthClient};
use tern_common::{Clock, RateLimitTracker};
use tern_core::{
    ApiResponse, AuthDependencies, AuthenticationStateMachine, CallbackListener,
    CallbackListenerFactory, PostQueue, PostingApi, QueueStore, StateMachineSettings,
};
use tern_domain::{
    CallbackResult, Config, PostReceipt, QueueSnapshot, Result, TernError, UserProfile,
};
use tokio_util::sync::CancellationToken;

pub const REDIRECT_URI: &str = "http://127.0.0.1:8765/callback";
pub const USERNAME: &str = "tern_dev";

/// What a scripted listener does when awaited.
#[derive(Debug, Clone)]
pub enum ListenerScript {
    Callback(CallbackResult),
    /// Never receives a redirect; resolves only on cancel or timeout.
    Hang,
}

pub struct ScriptedListener {
    script: ListenerScript,
    cancel: CancellationToken,
    stopped: AtomicBool,
}

impl ScriptedListener {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallbackListener for ScriptedListener {
    fn redirect_uri(&self) -> String {
        REDIRECT_URI.to_string()
    }

    async fn wait_for_callback(&self, timeout: Duration) -> Result<CallbackResult> {
        match &self.script {
            ListenerScript::Callback(result) => Ok(result.clone()),
            ListenerScript::Hang => tokio::select! {
                () = self.cancel.cancelled() => Err(TernError::CallbackCancelled),
                () = tokio::time::sleep(timeout) => Err(TernError::CallbackTimeout),
            },
        }
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }
}

/// Hands out one scripted listener per `start()`.
#[derive(Default)]
pub struct ScriptedListenerFactory {
    scripts: Mutex<VecDeque<ListenerScript>>,
    started: Mutex<Vec<Arc<ScriptedListener>>>,
}

impl ScriptedListenerFactory {
    pub fn push(&self, script: ListenerScript) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn push_callback(&self, code: &str, state: &str) {
        self.push(ListenerScript::Callback(CallbackResult::success(code, state)));
    }

    pub fn started(&self) -> Vec<Arc<ScriptedListener>> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl CallbackListenerFactory for ScriptedListenerFactory {
    async fn start(&self) -> Result<Arc<dyn CallbackListener>> {
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or(ListenerScript::Hang);
        let listener = Arc::new(ScriptedListener {
            script,
            cancel: CancellationToken::new(),
            stopped: AtomicBool::new(false),
        });
        self.started.lock().unwrap().push(Arc::clone(&listener));
        Ok(listener)
    }
}

/// Posting API double. Unscripted calls succeed.
#[derive(Default)]
pub struct ScriptedApi {
    posts: Mutex<VecDeque<ApiResponse<PostReceipt>>>,
    profile: Mutex<Option<Result<UserProfile>>>,
    calls: Mutex<Vec<(String, String)>>,
    next_id: AtomicUsize,
}

impl ScriptedApi {
    pub fn push_post(&self, response: ApiResponse<PostReceipt>) {
        self.posts.lock().unwrap().push_back(response);
    }

    pub fn push_post_error(&self, err: TernError) {
        self.push_post(ApiResponse::new(Err(err), None));
    }

    pub fn set_profile(&self, profile: Result<UserProfile>) {
        *self.profile.lock().unwrap() = Some(profile);
    }

    /// `(access_token, text)` of every `create_post` call.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostingApi for ScriptedApi {
    async fn create_post(&self, access_token: &str, text: &str) -> ApiResponse<PostReceipt> {
        self.calls.lock().unwrap().push((access_token.to_string(), text.to_string()));
        let scripted = self.posts.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            ApiResponse::new(Ok(PostReceipt { id: format!("tweet-{id}"), text: text.to_string() }), None)
        })
    }

    async fn current_user(&self, _access_token: &str) -> ApiResponse<UserProfile> {
        let scripted = self.profile.lock().unwrap().clone();
        let result = scripted.unwrap_or_else(|| {
            Ok(UserProfile { id: "42".into(), username: USERNAME.into(), name: None })
        });
        ApiResponse::new(result, None)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<QueueSnapshot>,
}

impl MemoryStore {
    pub fn with_snapshot(snapshot: QueueSnapshot) -> Self {
        Self { snapshot: Mutex::new(snapshot) }
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.snapshot.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn load(&self) -> Result<QueueSnapshot> {
        Ok(self.snapshot())
    }

    async fn save(&self, snapshot: &QueueSnapshot) -> Result<()> {
        *self.snapshot.lock().unwrap() = snapshot.clone();
        Ok(())
    }
}

/// A state machine wired to scripted doubles.
pub struct Harness {
    pub machine: AuthenticationStateMachine,
    pub config: Config,
    pub clock: MockClock,
    pub oauth: MockOAuthClient,
    pub keychain: MockKeychainProvider,
    pub browser: MockBrowserLauncher,
    pub listeners: Arc<ScriptedListenerFactory>,
    pub api: Arc<ScriptedApi>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::default())
    }

    pub fn with_store(store: MemoryStore) -> Self {
        Self::build(store, |_, _| {})
    }

    /// Wire a harness, letting `configure` adjust the defaults first.
    pub fn build(
        store: MemoryStore,
        configure: impl FnOnce(&mut Config, &mut StateMachineSettings),
    ) -> Self {
        let mut config = Config::with_client_id("test-client");
        config.queue.jitter_ms = 0;
        config.queue.base_delay_ms = 1_000;
        config.queue.max_delay_ms = 10_000;
        config.oauth.callback_timeout_secs = 5;
        let mut settings = StateMachineSettings::from(&config);
        settings.tick_interval = Duration::from_millis(100);
        configure(&mut config, &mut settings);

        let clock = MockClock::new();
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let oauth = MockOAuthClient::new();
        let keychain = MockKeychainProvider::default();
        let browser = MockBrowserLauncher::new();
        let listeners = Arc::new(ScriptedListenerFactory::default());
        let api = Arc::new(ScriptedApi::default());
        let store = Arc::new(store);

        let tokens = TokenManager::new(
            Arc::new(oauth.clone()),
            Arc::new(keychain.clone()),
            config.oauth.account_id.clone(),
            config.tokens.refresh_margin_secs,
        )
        .with_clock(Arc::clone(&shared_clock));
        let queue = PostQueue::new(store.clone(), &config.queue, Arc::clone(&shared_clock));

        let deps = AuthDependencies {
            oauth: Arc::new(oauth.clone()),
            tokens: Arc::new(tokens),
            listeners: listeners.clone(),
            browser: Arc::new(browser.clone()),
            api: api.clone(),
            rate_limits: Arc::new(RateLimitTracker::new(Arc::clone(&shared_clock))),
            queue: Arc::new(queue),
            clock: shared_clock,
        };
        Self {
            machine: AuthenticationStateMachine::new(deps, settings),
            config,
            clock,
            oauth,
            keychain,
            browser,
            listeners,
            api,
            store,
        }
    }

    /// Complete a successful authorization.
    pub async fn authenticated() -> Self {
        Self::new().sign_in().await
    }

    pub async fn sign_in(self) -> Self {
        self.listeners.push_callback("abc123", self.oauth.state());
        self.machine.authenticate().await.expect("authentication succeeds");
        self
    }
}
