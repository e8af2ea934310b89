//! Token manager with single-flight refresh
//!
//! Manages the OAuth token lifecycle:
//! - Token retrieval from the credential store
//! - Refresh before expiry (configurable margin, default 60 s)
//! - At most one refresh in flight; concurrent callers share its outcome
//! - Revocation handling (stored tokens are wiped)

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use futures::future::{BoxFuture, FutureExt, Shared};
use tern_domain::{Result, TernError};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::traits::{CredentialStore, OAuthClientTrait};
use super::types::TokenSet;
use crate::time::{Clock, SystemClock};

type RefreshFuture = Shared<BoxFuture<'static, Result<TokenSet>>>;

/// Owns the current [`TokenSet`] for one account.
///
/// Reads go through an async `RwLock`; refreshes are funnelled through a
/// shared future so that N concurrent callers trigger exactly one token
/// endpoint call.
pub struct TokenManager {
    oauth_client: Arc<dyn OAuthClientTrait>,
    store: Arc<dyn CredentialStore>,
    account: String,
    current: Arc<RwLock<Option<TokenSet>>>,
    in_flight: Arc<parking_lot::Mutex<Option<RefreshFuture>>>,
    refresh_margin: ChronoDuration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("account", &self.account)
            .field("refresh_margin", &self.refresh_margin)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Create a new token manager
    ///
    /// # Arguments
    /// * `oauth_client` - OAuth client used for refresh exchanges
    /// * `store` - Secure persistence for the token set
    /// * `account` - Account identity the tokens are stored under
    /// * `refresh_margin_secs` - Refresh when less than this many seconds of
    ///   validity remain
    pub fn new(
        oauth_client: Arc<dyn OAuthClientTrait>,
        store: Arc<dyn CredentialStore>,
        account: impl Into<String>,
        refresh_margin_secs: i64,
    ) -> Self {
        Self {
            oauth_client,
            store,
            account: account.into(),
            current: Arc::new(RwLock::new(None)),
            in_flight: Arc::new(parking_lot::Mutex::new(None)),
            refresh_margin: ChronoDuration::seconds(refresh_margin_secs),
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Load tokens from the credential store.
    ///
    /// Returns `true` if a token set was found.
    ///
    /// # Errors
    /// Returns `Keychain` if the store cannot be read.
    pub async fn initialize(&self) -> Result<bool> {
        match self.store.get(&self.account).await? {
            Some(tokens) => {
                *self.current.write().await = Some(tokens);
                info!(account = %self.account, "Token manager initialized with stored tokens");
                Ok(true)
            }
            None => {
                debug!(account = %self.account, "No stored tokens found");
                Ok(false)
            }
        }
    }

    /// Persist `tokens`, then make them current.
    ///
    /// # Errors
    /// Returns `Keychain` if the store rejects the write; memory is left
    /// unchanged in that case.
    pub async fn store(&self, tokens: TokenSet) -> Result<()> {
        Self::persist(&self.store, &self.account, &self.current, tokens).await
    }

    /// Wipe the in-memory and persisted token set.
    ///
    /// # Errors
    /// Returns `Keychain` if the persisted copy cannot be deleted; memory is
    /// cleared regardless.
    pub async fn clear(&self) -> Result<()> {
        *self.current.write().await = None;
        self.store.delete(&self.account).await?;
        info!(account = %self.account, "Tokens cleared");
        Ok(())
    }

    /// Always-current access token.
    ///
    /// Refreshes first when the token is inside the refresh margin and a
    /// refresh token exists. A token inside the margin but not yet expired
    /// is still returned when it cannot be refreshed.
    ///
    /// # Errors
    /// - `NotAuthenticated` when no tokens are held
    /// - `TokenExpired` when the token has expired and cannot be refreshed
    /// - any refresh failure (`AuthorizationRevoked` when the grant is gone)
    pub async fn current_access_token(&self) -> Result<String> {
        let now = self.clock.now();
        {
            let guard = self.current.read().await;
            let tokens = guard.as_ref().ok_or(TernError::NotAuthenticated)?;
            if !tokens.expires_within(self.refresh_margin, now) {
                return Ok(tokens.access_token.clone());
            }
            if !tokens.can_refresh() {
                if tokens.is_expired_at(now) {
                    return Err(TernError::TokenExpired);
                }
                return Ok(tokens.access_token.clone());
            }
        }

        let refreshed = self.refresh_single_flight().await?;
        Ok(refreshed.access_token)
    }

    /// Refresh regardless of expiry (e.g. after the API answered 401).
    ///
    /// # Errors
    /// Same as [`current_access_token`](Self::current_access_token).
    pub async fn force_refresh(&self) -> Result<TokenSet> {
        self.refresh_single_flight().await
    }

    /// Whether the next [`current_access_token`](Self::current_access_token)
    /// call would refresh.
    pub async fn needs_refresh(&self) -> bool {
        let now = self.clock.now();
        self.current
            .read()
            .await
            .as_ref()
            .is_some_and(|tokens| tokens.can_refresh() && tokens.expires_within(self.refresh_margin, now))
    }

    pub async fn is_authenticated(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Current token set without refreshing.
    pub async fn tokens(&self) -> Option<TokenSet> {
        self.current.read().await.clone()
    }

    /// Whether a refresh is currently running.
    #[must_use]
    pub fn refresh_in_flight(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    async fn refresh_single_flight(&self) -> Result<TokenSet> {
        let shared = {
            let mut slot = self.in_flight.lock();
            match slot.as_ref() {
                Some(running) => {
                    debug!(account = %self.account, "Joining in-flight token refresh");
                    running.clone()
                }
                None => {
                    let refresh = Self::run_refresh(
                        Arc::clone(&self.oauth_client),
                        Arc::clone(&self.store),
                        self.account.clone(),
                        Arc::clone(&self.current),
                    )
                    .boxed()
                    .shared();
                    *slot = Some(refresh.clone());
                    refresh
                }
            }
        };

        let outcome = shared.clone().await;

        let mut slot = self.in_flight.lock();
        if slot.as_ref().is_some_and(|running| running.ptr_eq(&shared)) {
            *slot = None;
        }
        outcome
    }

    async fn run_refresh(
        oauth_client: Arc<dyn OAuthClientTrait>,
        store: Arc<dyn CredentialStore>,
        account: String,
        current: Arc<RwLock<Option<TokenSet>>>,
    ) -> Result<TokenSet> {
        let previous_refresh = {
            let guard = current.read().await;
            let tokens = guard.as_ref().ok_or(TernError::NotAuthenticated)?;
            tokens.refresh_token.clone().filter(|token| !token.is_empty())
        };
        let Some(refresh_token) = previous_refresh else {
            return Err(TernError::TokenExpired);
        };

        debug!(account = %account, "Refreshing access token");
        match oauth_client.refresh_access_token(&refresh_token).await {
            Ok(mut refreshed) => {
                if refreshed.refresh_token.is_none() {
                    refreshed.refresh_token = Some(refresh_token);
                }
                Self::persist(&store, &account, &current, refreshed.clone()).await?;
                info!(account = %account, "Token refresh complete");
                Ok(refreshed)
            }
            Err(err) if err.is_refresh_rejection() => {
                warn!(account = %account, error = %err, "Refresh token rejected; wiping stored tokens");
                *current.write().await = None;
                if let Err(delete_err) = store.delete(&account).await {
                    warn!(account = %account, error = %delete_err, "Failed to delete revoked tokens");
                }
                Err(TernError::AuthorizationRevoked)
            }
            Err(err) => {
                warn!(account = %account, error = %err, "Token refresh failed");
                Err(err)
            }
        }
    }

    async fn persist(
        store: &Arc<dyn CredentialStore>,
        account: &str,
        current: &RwLock<Option<TokenSet>>,
        tokens: TokenSet,
    ) -> Result<()> {
        store.put(account, &tokens).await?;
        *current.write().await = Some(tokens);
        debug!(account = %account, "Tokens stored");
        Ok(())
    }
}

#[cfg(all(test, feature = "platform"))]
mod tests {
    //! Unit tests for auth::token_manager. Concurrency behaviour is covered
    //! in `tests/auth_integration.rs`.
    use chrono::Duration;

    use super::*;
    use crate::testing::{MockKeychainProvider, MockOAuthClient};
    use crate::time::MockClock;

    struct Fixture {
        manager: TokenManager,
        oauth: Arc<MockOAuthClient>,
        keychain: Arc<MockKeychainProvider>,
        clock: MockClock,
    }

    fn fixture() -> Fixture {
        let oauth = Arc::new(MockOAuthClient::new());
        let keychain = Arc::new(MockKeychainProvider::new("tern-test"));
        let clock = MockClock::new();
        let manager = TokenManager::new(oauth.clone(), keychain.clone(), "default", 60)
            .with_clock(Arc::new(clock.clone()));
        Fixture { manager, oauth, keychain, clock }
    }

    fn tokens_expiring_in(clock: &MockClock, secs: i64, refresh: Option<&str>) -> TokenSet {
        TokenSet::new(
            "access-old",
            refresh.map(str::to_string),
            Some(clock.now() + Duration::seconds(secs)),
            None,
        )
    }

    #[tokio::test]
    async fn test_not_authenticated_without_tokens() {
        let fx = fixture();
        assert!(!fx.manager.initialize().await.unwrap());
        assert_eq!(fx.manager.current_access_token().await, Err(TernError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_valid_token_returned_without_refresh() {
        let fx = fixture();
        fx.manager.store(tokens_expiring_in(&fx.clock, 3600, Some("r1"))).await.unwrap();

        assert_eq!(fx.manager.current_access_token().await.unwrap(), "access-old");
        assert!(!fx.manager.needs_refresh().await);
        assert_eq!(fx.oauth.refresh_calls(), 0);
    }

    /// Validates refresh inside the margin and refresh-token inheritance.
    ///
    /// Assertions:
    /// - The refreshed access token is returned.
    /// - The old refresh token is kept when the response omits one.
    /// - The refreshed set is persisted.
    #[tokio::test]
    async fn test_refresh_within_margin_inherits_refresh_token() {
        let fx = fixture();
        fx.manager.store(tokens_expiring_in(&fx.clock, 30, Some("r1"))).await.unwrap();
        fx.oauth.push_refresh_result(Ok(TokenSet::new(
            "access-new",
            None,
            Some(fx.clock.now() + Duration::hours(2)),
            None,
        )));

        assert!(fx.manager.needs_refresh().await);
        assert_eq!(fx.manager.current_access_token().await.unwrap(), "access-new");
        assert_eq!(fx.oauth.last_refresh_token().as_deref(), Some("r1"));

        let stored = fx.keychain.get(fx.manager.account()).await.unwrap().unwrap();
        assert_eq!(stored.access_token, "access-new");
        assert_eq!(stored.refresh_token.as_deref(), Some("r1"));
        assert!(!fx.manager.refresh_in_flight());
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token() {
        let fx = fixture();
        fx.manager.store(tokens_expiring_in(&fx.clock, 30, None)).await.unwrap();
        assert_eq!(fx.manager.current_access_token().await.unwrap(), "access-old");

        fx.clock.advance(Duration::seconds(31));
        assert_eq!(fx.manager.current_access_token().await, Err(TernError::TokenExpired));
        assert_eq!(fx.oauth.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_revoked_refresh_wipes_tokens() {
        let fx = fixture();
        fx.manager.store(tokens_expiring_in(&fx.clock, 0, Some("r1"))).await.unwrap();
        fx.oauth.push_refresh_result(Err(TernError::AccessDenied));

        assert_eq!(fx.manager.current_access_token().await, Err(TernError::AuthorizationRevoked));
        assert!(!fx.manager.is_authenticated().await);
        assert!(fx.keychain.get(fx.manager.account()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transient_refresh_failure_keeps_tokens() {
        let fx = fixture();
        fx.manager.store(tokens_expiring_in(&fx.clock, 0, Some("r1"))).await.unwrap();
        fx.oauth.push_refresh_result(Err(TernError::NetworkError("connection reset".into())));

        assert!(matches!(
            fx.manager.current_access_token().await,
            Err(TernError::NetworkError(_))
        ));
        assert!(fx.manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_initialize_and_clear() {
        let fx = fixture();
        fx.keychain
            .put("default", &tokens_expiring_in(&fx.clock, 3600, Some("r1")))
            .await
            .unwrap();

        assert!(fx.manager.initialize().await.unwrap());
        assert!(fx.manager.is_authenticated().await);

        fx.manager.clear().await.unwrap();
        assert!(!fx.manager.is_authenticated().await);
        assert!(fx.keychain.get("default").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_force_refresh_ignores_expiry() {
        let fx = fixture();
        fx.manager.store(tokens_expiring_in(&fx.clock, 3600, Some("r1"))).await.unwrap();
        fx.oauth.push_refresh_result(Ok(TokenSet::new("access-forced", Some("r2".into()), None, None)));

        let refreshed = fx.manager.force_refresh().await.unwrap();
        assert_eq!(refreshed.access_token, "access-forced");
        assert_eq!(fx.manager.tokens().await.unwrap().refresh_token.as_deref(), Some("r2"));
    }
}
