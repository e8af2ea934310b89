//! Configuration loader
//!
//! Loads [`Config`] from environment variables or files.
//!
//! ## Loading Strategy
//! 1. If `TERN_CLIENT_ID` is set, build the config from defaults plus `TERN_*`
//!    overrides
//! 2. Otherwise probe for a config file (TOML or JSON) and apply the same
//!    `TERN_*` overrides on top of it
//!
//! ## Environment Variables
//! - `TERN_CLIENT_ID`: OAuth client id (required for env-only loading)
//! - `TERN_AUTHORIZE_URL`, `TERN_TOKEN_URL`: OAuth endpoints
//! - `TERN_SCOPES`: space- or comma-separated scopes
//! - `TERN_CALLBACK_HOST`, `TERN_CALLBACK_PORT`, `TERN_CALLBACK_PATH`
//! - `TERN_CALLBACK_TIMEOUT_SECS`: how long to wait for consent
//! - `TERN_TOKEN_REQUEST_ENCODING`: `json` or `form`
//! - `TERN_ACCOUNT_ID`, `TERN_KEYCHAIN_SERVICE`: credential location
//! - `TERN_REFRESH_MARGIN_SECS`: proactive refresh margin
//! - `TERN_API_BASE_URL`, `TERN_API_USER_AGENT`
//! - `TERN_QUEUE_MAX_ATTEMPTS`, `TERN_QUEUE_PATH`
//! - `TERN_LOG_LEVEL`, `TERN_LOG_JSON`
//!
//! ## File Locations
//! The loader probes, in order, `tern.toml`, `tern.json`, `config.toml` and
//! `config.json` in the working directory, its two parents, and the
//! executable's directory.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tern_domain::{Config, Result, TernError, TokenRequestEncoding};

const CONFIG_FILE_NAMES: &[&str] = &["tern.toml", "tern.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `TernError::Config` if neither the environment nor any config
/// file yields a valid configuration.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            let mut config = load_from_file(None)?;
            apply_env_overrides(&mut config)?;
            Ok(config)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `TernError::Config` if `TERN_CLIENT_ID` is missing or any
/// override has an invalid value.
pub fn load_from_env() -> Result<Config> {
    let client_id = env_var("TERN_CLIENT_ID")?;
    if client_id.trim().is_empty() {
        return Err(TernError::Config("TERN_CLIENT_ID is empty".into()));
    }

    let mut config = Config::with_client_id(client_id);
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Apply `TERN_*` overrides on top of an existing configuration.
///
/// # Errors
/// Returns `TernError::Config` for values that fail to parse.
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Some(client_id) = env_opt("TERN_CLIENT_ID").filter(|id| !id.trim().is_empty()) {
        config.oauth.client_id = client_id;
    }
    if let Some(url) = env_opt("TERN_AUTHORIZE_URL") {
        config.oauth.authorize_url = url;
    }
    if let Some(url) = env_opt("TERN_TOKEN_URL") {
        config.oauth.token_url = url;
    }
    if let Some(scopes) = env_opt("TERN_SCOPES") {
        config.oauth.scopes = parse_scopes(&scopes);
    }
    if let Some(host) = env_opt("TERN_CALLBACK_HOST") {
        config.oauth.callback_host = host;
    }
    if let Some(port) = env_parse::<u16>("TERN_CALLBACK_PORT")? {
        config.oauth.callback_port = port;
    }
    if let Some(path) = env_opt("TERN_CALLBACK_PATH") {
        config.oauth.callback_path = path;
    }
    if let Some(secs) = env_parse::<u64>("TERN_CALLBACK_TIMEOUT_SECS")? {
        config.oauth.callback_timeout_secs = secs;
    }
    if let Some(encoding) = env_parse::<TokenRequestEncoding>("TERN_TOKEN_REQUEST_ENCODING")? {
        config.oauth.token_request_encoding = encoding;
    }
    if let Some(account) = env_opt("TERN_ACCOUNT_ID") {
        config.oauth.account_id = account;
    }
    if let Some(service) = env_opt("TERN_KEYCHAIN_SERVICE") {
        config.oauth.keychain_service = service;
    }
    if let Some(margin) = env_parse::<i64>("TERN_REFRESH_MARGIN_SECS")? {
        config.tokens.refresh_margin_secs = margin;
    }
    if let Some(url) = env_opt("TERN_API_BASE_URL") {
        config.api.base_url = url;
    }
    if let Some(agent) = env_opt("TERN_API_USER_AGENT") {
        config.api.user_agent = Some(agent);
    }
    if let Some(attempts) = env_parse::<u32>("TERN_QUEUE_MAX_ATTEMPTS")? {
        if attempts == 0 {
            return Err(TernError::Config("TERN_QUEUE_MAX_ATTEMPTS must be at least 1".into()));
        }
        config.queue.max_attempts = attempts;
    }
    if let Some(path) = env_opt("TERN_QUEUE_PATH") {
        config.queue.persistence_path = Some(PathBuf::from(path));
    }
    if let Some(level) = env_opt("TERN_LOG_LEVEL") {
        config.logging.level = level;
    }
    config.logging.json = env_bool("TERN_LOG_JSON", config.logging.json);
    Ok(())
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations (see
/// [`probe_config_paths`]). Format is chosen by extension.
///
/// # Errors
/// Returns `TernError::Config` if the file is missing, unreadable, or
/// malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(TernError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            TernError::Config(
                "No config file found and TERN_CLIENT_ID is not set".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| TernError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    let config: Config = match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| TernError::Config(format!("Invalid TOML format: {e}")))?,
        "json" => serde_json::from_str(contents)
            .map_err(|e| TernError::Config(format!("Invalid JSON format: {e}")))?,
        _ => return Err(TernError::Config(format!("Unsupported config format: {extension}"))),
    };

    if config.oauth.client_id.trim().is_empty() {
        return Err(TernError::Config("oauth.client_id must not be empty".into()));
    }
    Ok(config)
}

/// First existing config file in the standard locations.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.extend(cwd.ancestors().take(3).map(Path::to_path_buf));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|scope| !scope.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| TernError::Config(format!("Missing required environment variable: {key}")))
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    env_opt(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| TernError::Config(format!("Invalid {key}: {e}")))
        })
        .transpose()
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive).
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
