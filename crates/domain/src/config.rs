//! Configuration structures
//!
//! Built once at process start (see `tern_infra::config::loader`) and passed
//! by reference to the components that need them. Every field except
//! `oauth.client_id` has a default.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    AUTH_REQUEST_TIMEOUT_SECS, AUTH_RESOURCE_TIMEOUT_SECS, DEFAULT_ACCOUNT_ID,
    DEFAULT_API_BASE_URL, DEFAULT_AUTHORIZE_URL, DEFAULT_CALLBACK_HOST, DEFAULT_CALLBACK_PATH,
    DEFAULT_CALLBACK_TIMEOUT_SECS, DEFAULT_KEYCHAIN_SERVICE, DEFAULT_QUEUE_BASE_DELAY_MS,
    DEFAULT_QUEUE_JITTER_MS, DEFAULT_QUEUE_MAX_ATTEMPTS, DEFAULT_QUEUE_MAX_DELAY_MS,
    DEFAULT_QUEUE_TICK_INTERVAL_SECS, DEFAULT_REFRESH_MARGIN_SECS, DEFAULT_SCOPES,
    DEFAULT_TOKEN_URL,
};
use crate::impl_domain_status_conversions;

/// Top-level application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub oauth: OAuthSettings,
    #[serde(default)]
    pub tokens: TokenSettings,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Configuration with defaults for everything but the client id.
    pub fn with_client_id(client_id: impl Into<String>) -> Self {
        Self {
            oauth: OAuthSettings::new(client_id),
            tokens: TokenSettings::default(),
            api: ApiSettings::default(),
            queue: QueueConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// How token-endpoint request bodies are encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenRequestEncoding {
    #[default]
    Json,
    Form,
}

impl_domain_status_conversions!(TokenRequestEncoding {
    Json => "json",
    Form => "form",
});

/// OAuth client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthSettings {
    pub client_id: String,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_callback_host")]
    pub callback_host: String,
    /// `0` asks the OS for an ephemeral port.
    #[serde(default)]
    pub callback_port: u16,
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
    #[serde(default = "default_callback_timeout_secs")]
    pub callback_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_resource_timeout_secs")]
    pub resource_timeout_secs: u64,
    #[serde(default)]
    pub token_request_encoding: TokenRequestEncoding,
    #[serde(default = "default_account_id")]
    pub account_id: String,
    #[serde(default = "default_keychain_service")]
    pub keychain_service: String,
}

impl OAuthSettings {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            scopes: default_scopes(),
            callback_host: default_callback_host(),
            callback_port: 0,
            callback_path: default_callback_path(),
            callback_timeout_secs: default_callback_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            resource_timeout_secs: default_resource_timeout_secs(),
            token_request_encoding: TokenRequestEncoding::default(),
            account_id: default_account_id(),
            keychain_service: default_keychain_service(),
        }
    }

    #[must_use]
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn resource_timeout(&self) -> Duration {
        Duration::from_secs(self.resource_timeout_secs)
    }
}

/// Token lifecycle settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSettings {
    /// Refresh proactively when less than this many seconds remain.
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: i64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self { refresh_margin_secs: default_refresh_margin_secs() }
    }
}

/// Posting API settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: None,
        }
    }
}

/// Retry queue settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// When unset the queue is kept in memory only.
    #[serde(default)]
    pub persistence_path: Option<PathBuf>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
            tick_interval_secs: default_tick_interval_secs(),
            persistence_path: None,
        }
    }
}

impl QueueConfig {
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    #[must_use]
    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), json: false }
    }
}

fn default_authorize_url() -> String {
    DEFAULT_AUTHORIZE_URL.to_string()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect()
}

fn default_callback_host() -> String {
    DEFAULT_CALLBACK_HOST.to_string()
}

fn default_callback_path() -> String {
    DEFAULT_CALLBACK_PATH.to_string()
}

fn default_callback_timeout_secs() -> u64 {
    DEFAULT_CALLBACK_TIMEOUT_SECS
}

fn default_request_timeout_secs() -> u64 {
    AUTH_REQUEST_TIMEOUT_SECS
}

fn default_resource_timeout_secs() -> u64 {
    AUTH_RESOURCE_TIMEOUT_SECS
}

fn default_account_id() -> String {
    DEFAULT_ACCOUNT_ID.to_string()
}

fn default_keychain_service() -> String {
    DEFAULT_KEYCHAIN_SERVICE.to_string()
}

fn default_refresh_margin_secs() -> i64 {
    DEFAULT_REFRESH_MARGIN_SECS
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_max_attempts() -> u32 {
    DEFAULT_QUEUE_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_QUEUE_BASE_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    DEFAULT_QUEUE_MAX_DELAY_MS
}

fn default_jitter_ms() -> u64 {
    DEFAULT_QUEUE_JITTER_MS
}

fn default_tick_interval_secs() -> u64 {
    DEFAULT_QUEUE_TICK_INTERVAL_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [oauth]
            client_id = "abc"
            "#,
        )
        .unwrap();

        assert_eq!(config.oauth.client_id, "abc");
        assert_eq!(config.oauth.callback_port, 0);
        assert_eq!(config.oauth.callback_path, "/callback");
        assert_eq!(config.oauth.token_request_encoding, TokenRequestEncoding::Json);
        assert_eq!(config.tokens.refresh_margin_secs, 60);
        assert_eq!(config.queue.max_attempts, 5);
        assert!(config.queue.persistence_path.is_none());
        assert_eq!(config, Config::with_client_id("abc"));
    }

    #[test]
    fn overrides_are_honoured() {
        let config: Config = serde_json::from_str(
            r#"{
                "oauth": {"client_id": "abc", "callback_port": 8765, "token_request_encoding": "form"},
                "queue": {"max_attempts": 3, "persistence_path": "/tmp/tern-queue.json"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.oauth.callback_port, 8765);
        assert_eq!(config.oauth.token_request_encoding, TokenRequestEncoding::Form);
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.queue.base_delay(), Duration::from_secs(2));
    }
}
