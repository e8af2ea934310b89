use std::sync::Arc;

use tern_common::auth::BrowserLauncher;
use tern_domain::Result;
use tracing::warn;

/// Prints the authorization URL and optionally hands it to a real launcher.
///
/// A launcher failure is logged but not fatal: the user can still copy the
/// printed URL, and the flow keeps waiting for the redirect.
pub struct ConsoleBrowserLauncher {
    inner: Option<Arc<dyn BrowserLauncher>>,
}

impl ConsoleBrowserLauncher {
    /// `None` only prints the URL (`--no-browser`).
    pub fn new(inner: Option<Arc<dyn BrowserLauncher>>) -> Self {
        Self { inner }
    }
}

impl BrowserLauncher for ConsoleBrowserLauncher {
    fn open(&self, url: &str) -> Result<()> {
        eprintln!("Open this URL to authorize Tern:\n\n  {url}\n");

        if let Some(inner) = &self.inner {
            if let Err(err) = inner.open(url) {
                warn!(error = %err, "Could not open browser; use the printed URL instead");
            }
        }
        Ok(())
    }
}
