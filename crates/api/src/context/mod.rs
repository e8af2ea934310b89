//! Application context - dependency injection container

use std::sync::Arc;

use tern_common::auth::{BrowserLauncher, CredentialStore, OAuthClient, OAuthConfig, TokenManager};
use tern_common::{Clock, Feed, KeychainProvider, RateLimitTracker, SystemClock};
use tern_core::{
    AuthDependencies, AuthenticationStateMachine, CallbackListenerFactory, PostQueue, PostingApi,
    QueueStore, StateMachineSettings,
};
use tern_domain::{AuthenticationState, Config, RateLimitEvent, Result};
use tern_infra::{
    JsonQueueStore, LoopbackListenerFactory, LoopbackSettings, MemoryQueueStore, XApiClient,
};
use tracing::{info, warn};

/// Everything a command needs, wired once per process.
pub struct AppContext {
    pub config: Config,
    pub machine: AuthenticationStateMachine,
    pub rate_limit_events: Feed<RateLimitEvent>,
    persistent_queue: bool,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("state", &self.machine.state())
            .field("persistent_queue", &self.persistent_queue)
            .finish_non_exhaustive()
    }
}

/// Overridable collaborators; anything left `None` gets the production
/// implementation.
#[derive(Default)]
pub struct ContextOverrides {
    pub credentials: Option<Arc<dyn CredentialStore>>,
    pub browser: Option<Arc<dyn BrowserLauncher>>,
    pub listeners: Option<Arc<dyn CallbackListenerFactory>>,
    pub api: Option<Arc<dyn PostingApi>>,
    pub clock: Option<Arc<dyn Clock>>,
}

impl AppContext {
    /// Wire production adapters for `config`.
    ///
    /// # Errors
    /// `Config` or `Internal` if an HTTP client cannot be built.
    pub fn new(config: Config, browser: Arc<dyn BrowserLauncher>) -> Result<Self> {
        Self::with_overrides(
            config,
            ContextOverrides { browser: Some(browser), ..ContextOverrides::default() },
        )
    }

    /// Wire the context, substituting any collaborators given in `overrides`.
    ///
    /// # Errors
    /// `Config` or `Internal` if an HTTP client cannot be built.
    pub fn with_overrides(config: Config, overrides: ContextOverrides) -> Result<Self> {
        let clock = overrides.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let rate_limit_events = Feed::new();
        let rate_limits = Arc::new(
            RateLimitTracker::new(Arc::clone(&clock)).with_events(rate_limit_events.clone()),
        );

        let oauth = Arc::new(
            OAuthClient::new(OAuthConfig::from(&config.oauth))?
                .with_rate_limits(Arc::clone(&rate_limits))
                .with_clock(Arc::clone(&clock)),
        );

        let credentials = overrides.credentials.unwrap_or_else(|| {
            Arc::new(KeychainProvider::new(config.oauth.keychain_service.clone()))
        });
        let tokens = Arc::new(
            TokenManager::new(
                oauth.clone(),
                credentials,
                config.oauth.account_id.clone(),
                config.tokens.refresh_margin_secs,
            )
            .with_clock(Arc::clone(&clock)),
        );

        let (store, persistent_queue): (Arc<dyn QueueStore>, bool) =
            match &config.queue.persistence_path {
                Some(path) => (Arc::new(JsonQueueStore::new(path)), true),
                None => (Arc::new(MemoryQueueStore::new()), false),
            };
        let queue = Arc::new(PostQueue::new(store, &config.queue, Arc::clone(&clock)));

        let api = match overrides.api {
            Some(api) => api,
            None => Arc::new(XApiClient::new(&config.api)?.with_clock(Arc::clone(&clock))),
        };
        let listeners = overrides.listeners.unwrap_or_else(|| {
            Arc::new(LoopbackListenerFactory::new(LoopbackSettings::from(&config.oauth)))
        });
        let browser = overrides
            .browser
            .unwrap_or_else(|| Arc::new(tern_infra::SystemBrowserLauncher::new()));

        let deps = AuthDependencies {
            oauth,
            tokens,
            listeners,
            browser,
            api,
            rate_limits,
            queue,
            clock,
        };
        let machine = AuthenticationStateMachine::new(deps, StateMachineSettings::from(&config));

        Ok(Self { config, machine, rate_limit_events, persistent_queue })
    }

    /// Whether queued posts survive process exit.
    pub fn persistent_queue(&self) -> bool {
        self.persistent_queue
    }

    /// Load persisted queue and tokens.
    ///
    /// # Errors
    /// `Storage` or `Keychain` if persisted state cannot be read.
    pub async fn restore(&self) -> Result<AuthenticationState> {
        let state = self.machine.restore().await?;
        if !self.persistent_queue {
            warn!("queue.persistence_path is not set; queued posts are kept in memory only");
        }
        info!(state = state.label(), "Application context restored");
        Ok(state)
    }

    /// Stop background work and cancel any pending authorization.
    pub async fn shutdown(&self) {
        self.machine.shutdown().await;
    }
}
