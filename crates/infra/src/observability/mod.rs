//! Logging setup
//!
//! Installs a global `tracing` subscriber. `RUST_LOG` takes precedence over
//! the configured level; output goes to stderr so command output on stdout
//! stays machine-readable.

use tern_domain::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Build the level filter: `RUST_LOG`, then `config.level`, then `info`.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed; calling it more
/// than once is harmless.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let text_layer =
        (!config.json).then(|| fmt::layer().with_target(true).with_writer(std::io::stderr));
    let json_layer = config
        .json
        .then(|| fmt::layer().json().with_current_span(false).with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(build_filter(config))
        .with(text_layer)
        .with(json_layer)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        let config = LoggingConfig { level: "debug".into(), json: true };
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }

    #[test]
    fn configured_level_applies_without_rust_log() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let filter = build_filter(&LoggingConfig { level: "debug".into(), json: false });
        assert_eq!(filter.max_level_hint(), Some(tracing_subscriber::filter::LevelFilter::DEBUG));
    }
}
