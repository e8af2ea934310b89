//! Opens the authorization URL in the user's default browser
use std::process::{Command, Stdio};

use tern_common::auth::BrowserLauncher;
use tern_domain::{Result, TernError};
use tracing::{debug, warn};

/// Launches the platform URL opener (`open`, `xdg-open`, `rundll32`).
///
/// `open` waits for the opener to exit, so async callers run it on the
/// blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowserLauncher;

impl SystemBrowserLauncher {
    pub fn new() -> Self {
        Self
    }
}

/// Program and arguments that open `url` on `os`, a
/// `std::env::consts::OS` value.
fn opener_for(os: &str, url: &str) -> Result<(&'static str, Vec<String>)> {
    match os {
        "macos" => Ok(("open", vec![url.to_string()])),
        // `cmd /C start` re-parses the URL and cuts it at the first `&`.
        "windows" => {
            Ok(("rundll32", vec!["url.dll,FileProtocolHandler".to_string(), url.to_string()]))
        }
        "linux" | "freebsd" | "openbsd" | "netbsd" | "dragonfly" => {
            Ok(("xdg-open", vec![url.to_string()]))
        }
        _ => Err(TernError::UnsupportedPlatform),
    }
}

impl BrowserLauncher for SystemBrowserLauncher {
    fn open(&self, url: &str) -> Result<()> {
        if url.trim().is_empty() {
            return Err(TernError::BrowserLaunchFailed("authorization URL is empty".into()));
        }

        let (program, args) = opener_for(std::env::consts::OS, url)?;
        debug!(program, "Opening authorization URL in browser");

        let status = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|err| {
                warn!(error = %err, "Failed to spawn browser opener");
                TernError::BrowserLaunchFailed(err.to_string())
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(TernError::BrowserLaunchFailed(format!("browser opener exited with {status}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_url_is_rejected_without_spawning() {
        let err = SystemBrowserLauncher::new().open("  ").unwrap_err();
        assert!(matches!(err, TernError::BrowserLaunchFailed(_)));
    }

    #[test]
    fn linux_uses_xdg_open() {
        let (program, args) = opener_for("linux", "https://example.com").unwrap();
        assert_eq!(program, "xdg-open");
        assert_eq!(args, ["https://example.com"]);
    }

    #[test]
    fn windows_passes_query_string_as_one_argument() {
        let url = "https://x.com/i/oauth2/authorize?response_type=code&client_id=abc&state=xyz";
        let (program, args) = opener_for("windows", url).unwrap();
        assert_eq!(program, "rundll32");
        assert_eq!(args, ["url.dll,FileProtocolHandler", url]);
    }

    #[test]
    fn macos_uses_open() {
        let (program, args) = opener_for("macos", "https://example.com/?a=1&b=2").unwrap();
        assert_eq!(program, "open");
        assert_eq!(args, ["https://example.com/?a=1&b=2"]);
    }

    #[test]
    fn unknown_platform_is_unsupported() {
        assert_eq!(opener_for("plan9", "https://example.com"), Err(TernError::UnsupportedPlatform));
    }
}
