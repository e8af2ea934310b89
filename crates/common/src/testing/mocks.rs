//! Mock implementations of the auth seams
//!
//! All mocks are cheap to clone and share state between clones, so a test
//! can keep a handle while the code under test owns another.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use tern_domain::{Result, TernError};

use crate::auth::keychain::{decode_tokens, encode_tokens, tokens_key};
use crate::auth::traits::{BrowserLauncher, CredentialStore, OAuthClientTrait};
use crate::auth::types::TokenSet;

/// In-memory keychain using the same entry layout as
/// [`KeychainProvider`](crate::security::KeychainProvider).
#[derive(Clone, Debug)]
pub struct MockKeychainProvider {
    storage: Arc<Mutex<HashMap<String, String>>>,
    service_name: String,
    fail_writes: Arc<AtomicBool>,
    fail_reads: Arc<AtomicBool>,
    put_calls: Arc<AtomicUsize>,
    delete_calls: Arc<AtomicUsize>,
}

impl MockKeychainProvider {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            storage: Arc::new(Mutex::new(HashMap::new())),
            service_name: service_name.into(),
            fail_writes: Arc::new(AtomicBool::new(false)),
            fail_reads: Arc::new(AtomicBool::new(false)),
            put_calls: Arc::new(AtomicUsize::new(0)),
            delete_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Make `put` and `delete` fail with a keychain error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `get` fail with a keychain error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Raw entry lookup, e.g. `secret("tokens.default")`.
    #[must_use]
    pub fn secret(&self, key: &str) -> Option<String> {
        self.storage.lock().get(key).cloned()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.lock().is_empty()
    }

    fn write_guard(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TernError::Keychain("mock keychain write failure".into()));
        }
        Ok(())
    }
}

impl Default for MockKeychainProvider {
    fn default() -> Self {
        Self::new("tern-test")
    }
}

#[async_trait]
impl CredentialStore for MockKeychainProvider {
    async fn put(&self, account: &str, tokens: &TokenSet) -> Result<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.write_guard()?;

        let entry = encode_tokens(tokens)?;
        self.storage.lock().insert(tokens_key(account), entry);
        Ok(())
    }

    async fn get(&self, account: &str) -> Result<Option<TokenSet>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(TernError::Keychain("mock keychain read failure".into()));
        }

        let entry = self.storage.lock().get(&tokens_key(account)).cloned();
        match entry {
            Some(raw) => Ok(Some(decode_tokens(&raw)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, account: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.write_guard()?;

        self.storage.lock().remove(&tokens_key(account));
        Ok(())
    }
}

/// OAuth client double with scripted results.
///
/// Emulates the pending-request bookkeeping of the real client: exchanges
/// fail with `MissingVerifier` unless a flow was started, and with
/// `StateMismatch` unless the state matches [`MockOAuthClient::state`].
#[derive(Clone, Debug)]
pub struct MockOAuthClient {
    state: String,
    pending: Arc<AtomicBool>,
    exchange_results: Arc<Mutex<VecDeque<Result<TokenSet>>>>,
    refresh_results: Arc<Mutex<VecDeque<Result<TokenSet>>>>,
    refresh_delay: Arc<Mutex<Option<Duration>>>,
    last_refresh_token: Arc<Mutex<Option<String>>>,
    last_authorization_url: Arc<Mutex<Option<String>>>,
    start_calls: Arc<AtomicUsize>,
    exchange_calls: Arc<AtomicUsize>,
    refresh_calls: Arc<AtomicUsize>,
    cancel_calls: Arc<AtomicUsize>,
}

impl MockOAuthClient {
    pub fn new() -> Self {
        Self::with_state("mock-state")
    }

    /// Use `state` as the CSRF state of every started flow.
    pub fn with_state(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            pending: Arc::new(AtomicBool::new(false)),
            exchange_results: Arc::new(Mutex::new(VecDeque::new())),
            refresh_results: Arc::new(Mutex::new(VecDeque::new())),
            refresh_delay: Arc::new(Mutex::new(None)),
            last_refresh_token: Arc::new(Mutex::new(None)),
            last_authorization_url: Arc::new(Mutex::new(None)),
            start_calls: Arc::new(AtomicUsize::new(0)),
            exchange_calls: Arc::new(AtomicUsize::new(0)),
            refresh_calls: Arc::new(AtomicUsize::new(0)),
            cancel_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Queue the result of the next code exchange.
    pub fn push_exchange_result(&self, result: Result<TokenSet>) {
        self.exchange_results.lock().push_back(result);
    }

    /// Queue the result of the next refresh.
    pub fn push_refresh_result(&self, result: Result<TokenSet>) {
        self.refresh_results.lock().push_back(result);
    }

    /// Delay every refresh, to widen race windows in concurrency tests.
    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock() = Some(delay);
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn last_refresh_token(&self) -> Option<String> {
        self.last_refresh_token.lock().clone()
    }

    #[must_use]
    pub fn last_authorization_url(&self) -> Option<String> {
        self.last_authorization_url.lock().clone()
    }

    #[must_use]
    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    fn default_tokens(access: &str, refresh: &str) -> TokenSet {
        TokenSet::new(
            access,
            Some(refresh.to_string()),
            Some(Utc::now() + ChronoDuration::hours(2)),
            Some("tweet.read tweet.write users.read offline.access".to_string()),
        )
    }
}

impl Default for MockOAuthClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OAuthClientTrait for MockOAuthClient {
    async fn start_authorization_flow(
        &self,
        scopes: &[String],
        redirect_uri: &str,
    ) -> Result<String> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.pending.store(true, Ordering::SeqCst);
        let url = format!(
            "https://mock.x.test/i/oauth2/authorize?state={}&redirect_uri={}&scope={}",
            self.state,
            redirect_uri,
            scopes.join("+")
        );
        *self.last_authorization_url.lock() = Some(url.clone());
        Ok(url)
    }

    async fn exchange_code_for_token(&self, _code: &str, state: &str) -> Result<TokenSet> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        if !self.pending.swap(false, Ordering::SeqCst) {
            return Err(TernError::MissingVerifier);
        }
        if state != self.state {
            return Err(TernError::StateMismatch);
        }
        self.exchange_results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Self::default_tokens("mock_access_token", "mock_refresh_token")))
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenSet> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_refresh_token.lock() = Some(refresh_token.to_string());

        let delay = *self.refresh_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.refresh_results.lock().pop_front().unwrap_or_else(|| {
            Ok(Self::default_tokens("refreshed_access_token", "refreshed_refresh_token"))
        })
    }

    async fn cancel_pending(&self) {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.pending.store(false, Ordering::SeqCst);
    }
}

/// Browser launcher that records opened URLs.
#[derive(Clone, Debug, Default)]
pub struct MockBrowserLauncher {
    opened: Arc<Mutex<Vec<String>>>,
    fail: Arc<AtomicBool>,
}

impl MockBrowserLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `open` fail with `BrowserLaunchFailed`.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

impl BrowserLauncher for MockBrowserLauncher {
    fn open(&self, url: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TernError::BrowserLaunchFailed("mock browser unavailable".into()));
        }
        self.opened.lock().push(url.to_string());
        Ok(())
    }
}
