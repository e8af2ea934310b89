//! Tern - post to X from the terminal
//!
//! Main entry point for the `tern` binary.

use std::fmt::Display;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tern_app::adapters::ConsoleBrowserLauncher;
use tern_app::cli::{Cli, Command};
use tern_app::{commands, AppContext};
use tern_common::auth::BrowserLauncher;
use tern_domain::Config;
use tern_infra::{config, init_logging, SystemBrowserLauncher};
use tracing::{debug, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load .env before reading TERN_* variables
    let dotenv = dotenvy::dotenv();

    let config = match load_config(cli.config.clone()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::from(2);
        }
    };

    init_logging(&config.logging);
    match dotenv {
        Ok(path) => debug!(path = %path.display(), "Loaded .env"),
        Err(err) if err.not_found() => {}
        Err(err) => warn!(error = %err, "Could not load .env file"),
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            let mut loaded = config::load_from_file(Some(path.clone()))
                .with_context(|| format!("failed to load {}", path.display()))?;
            config::apply_env_overrides(&mut loaded)?;
            Ok(loaded)
        }
        None => config::load().context("failed to load configuration"),
    }
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let system_browser: Option<Arc<dyn BrowserLauncher>> = match cli.command {
        Command::Auth { no_browser: true } => None,
        _ => Some(Arc::new(SystemBrowserLauncher::new())),
    };
    let ctx = AppContext::new(config, Arc::new(ConsoleBrowserLauncher::new(system_browser)))?;
    ctx.restore().await.context("failed to restore saved state")?;

    let json = cli.json;
    let result = dispatch(&ctx, cli.command, json).await;
    ctx.shutdown().await;
    result
}

async fn dispatch(ctx: &AppContext, command: Command, json: bool) -> Result<()> {
    match command {
        Command::Auth { .. } => emit(json, &commands::authenticate(ctx).await?),
        Command::Post { text } => {
            let text = match text {
                Some(text) => text,
                None => read_stdin()?,
            };
            emit(json, &commands::post(ctx, &text).await?)
        }
        Command::Status => emit(json, &commands::status(ctx).await?),
        Command::Drain => emit(json, &commands::drain(ctx).await?),
        Command::Queue { clear_failed: true } => {
            let removed = commands::clear_failed(ctx).await?;
            emit(json, &format!("Removed {removed} failed post(s)"))
        }
        Command::Queue { clear_failed: false } => emit(json, &commands::list_queue(ctx).await?),
        Command::Refresh => {
            let state = commands::refresh(ctx).await?;
            emit(json, &format!("Token refreshed ({})", state.label()))
        }
        Command::Disconnect => {
            commands::disconnect(ctx).await?;
            emit(json, &"Disconnected")
        }
        Command::Watch => {
            commands::watch(ctx, async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!(error = %err, "Could not listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            })
            .await?;
            Ok(())
        }
    }
}

fn emit<T: Serialize + Display + ?Sized>(json: bool, value: &T) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{value}");
    }
    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text).context("failed to read post text from stdin")?;
    Ok(text.trim_end_matches(['\r', '\n']).to_string())
}
