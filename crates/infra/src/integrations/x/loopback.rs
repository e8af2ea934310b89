//! Loopback HTTP server that receives the OAuth redirect.
//!
//! Each authorization attempt gets its own server bound to `127.0.0.1`
//! (ephemeral port unless configured). The first request to the callback
//! path resolves the waiting flow and shuts the server down; any other path
//! answers 404 and leaves the wait pending.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tern_core::{CallbackListener, CallbackListenerFactory};
use tern_domain::{CallbackResult, OAuthSettings, Result, TernError};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Complete</title></head>
<body><h1>Authorization Successful</h1><p>You can close this window and return to Tern.</p></body>
</html>"#;

const FAILURE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Failed</title></head>
<body><h1>Authorization Failed</h1><p>Tern was not authorized. You can close this window.</p></body>
</html>"#;

/// Where the loopback server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopbackSettings {
    pub host: String,
    /// `0` lets the OS pick a free port.
    pub port: u16,
    pub path: String,
}

impl From<&OAuthSettings> for LoopbackSettings {
    fn from(settings: &OAuthSettings) -> Self {
        Self {
            host: settings.callback_host.clone(),
            port: settings.callback_port,
            path: settings.callback_path.clone(),
        }
    }
}

struct CallbackSlot {
    sender: parking_lot::Mutex<Option<oneshot::Sender<CallbackResult>>>,
    shutdown: CancellationToken,
}

/// Single-use OAuth redirect listener.
pub struct LoopbackCallbackServer {
    addr: SocketAddr,
    redirect_uri: String,
    receiver: tokio::sync::Mutex<Option<oneshot::Receiver<CallbackResult>>>,
    cancel: CancellationToken,
    shutdown: CancellationToken,
    handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for LoopbackCallbackServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackCallbackServer")
            .field("addr", &self.addr)
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

impl LoopbackCallbackServer {
    /// Bind and start serving.
    ///
    /// # Errors
    /// - `Config` if the callback path does not start with `/`
    /// - `NetworkError` if the address cannot be bound
    pub async fn start(settings: &LoopbackSettings) -> Result<Self> {
        if !settings.path.starts_with('/') {
            return Err(TernError::Config(format!(
                "callback path must start with '/': {}",
                settings.path
            )));
        }

        let listener = TcpListener::bind((settings.host.as_str(), settings.port)).await.map_err(|err| {
            TernError::NetworkError(format!("failed to bind OAuth loopback server: {err}"))
        })?;
        let addr = listener
            .local_addr()
            .map_err(|err| TernError::NetworkError(format!("failed to determine port: {err}")))?;

        let (sender, receiver) = oneshot::channel();
        let shutdown = CancellationToken::new();
        let slot = Arc::new(CallbackSlot {
            sender: parking_lot::Mutex::new(Some(sender)),
            shutdown: shutdown.clone(),
        });

        let app = Router::new()
            .route(&settings.path, get(handle_callback))
            .fallback(not_found)
            .with_state(slot);

        let signal = shutdown.clone().cancelled_owned();
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).with_graceful_shutdown(signal).await {
                error!(error = %err, "OAuth callback server error");
            }
            debug!("OAuth callback server stopped");
        });

        let redirect_uri = format!("http://{}:{}{}", settings.host, addr.port(), settings.path);
        info!(redirect_uri = %redirect_uri, "OAuth callback server listening");

        Ok(Self {
            addr,
            redirect_uri,
            receiver: tokio::sync::Mutex::new(Some(receiver)),
            cancel: CancellationToken::new(),
            shutdown,
            handle: parking_lot::Mutex::new(Some(handle)),
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop serving and wait until the port is released.
    pub async fn shutdown(&self) {
        CallbackListener::stop(self);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(error = %err, "OAuth callback server task failed");
            }
        }
    }
}

#[async_trait]
impl CallbackListener for LoopbackCallbackServer {
    fn redirect_uri(&self) -> String {
        self.redirect_uri.clone()
    }

    async fn wait_for_callback(&self, timeout: Duration) -> Result<CallbackResult> {
        let Ok(mut slot) = self.receiver.try_lock() else {
            return Err(TernError::CallbackAlreadyAwaited);
        };
        let Some(receiver) = slot.as_mut() else {
            return Err(TernError::CallbackCancelled);
        };

        let outcome = tokio::select! {
            () = self.cancel.cancelled() => Err(TernError::CallbackCancelled),
            () = tokio::time::sleep(timeout) => Err(TernError::CallbackTimeout),
            received = receiver => received.map_err(|_| TernError::CallbackCancelled),
        };

        match &outcome {
            Ok(_) => *slot = None,
            Err(TernError::CallbackTimeout) => {
                warn!(timeout = ?timeout, "Timed out waiting for OAuth callback");
                drop(slot);
                self.stop();
            }
            Err(_) => {}
        }
        outcome
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }

    fn stop(&self) {
        self.cancel.cancel();
        self.shutdown.cancel();
    }
}

impl Drop for LoopbackCallbackServer {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.shutdown.cancel();
        if let Some(handle) = self.handle.get_mut().take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}

async fn handle_callback(
    State(slot): State<Arc<CallbackSlot>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Html<&'static str> {
    let result = CallbackResult::from_query_pairs(params);
    let page = if result.is_error() { FAILURE_PAGE } else { SUCCESS_PAGE };

    let sender = slot.sender.lock().take();
    match sender {
        Some(sender) => {
            info!(denied = result.is_error(), "OAuth callback received");
            if sender.send(result).is_err() {
                debug!("OAuth callback arrived after the listener was released");
            }
            slot.shutdown.cancel();
        }
        None => debug!("Ignoring repeated OAuth callback"),
    }
    Html(page)
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// Starts a fresh [`LoopbackCallbackServer`] per authorization attempt.
#[derive(Debug, Clone)]
pub struct LoopbackListenerFactory {
    settings: LoopbackSettings,
}

impl LoopbackListenerFactory {
    pub fn new(settings: LoopbackSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl CallbackListenerFactory for LoopbackListenerFactory {
    async fn start(&self) -> Result<Arc<dyn CallbackListener>> {
        let server = LoopbackCallbackServer::start(&self.settings).await?;
        Ok(Arc::new(server))
    }
}
