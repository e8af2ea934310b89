//! Command-line interface definition

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "tern", version, about = "Post to X from the terminal")]
pub struct Cli {
    /// Config file (TOML or JSON). Defaults to environment, then a probe of
    /// `tern.toml`/`config.toml` in standard locations.
    #[arg(long, global = true, env = "TERN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect an X account through the browser consent flow.
    Auth {
        /// Only print the authorization URL.
        #[arg(long)]
        no_browser: bool,
    },
    /// Publish a post, queueing it for retry on transient failure.
    Post {
        /// Post text; read from stdin when omitted.
        text: Option<String>,
    },
    /// Show authentication, queue and rate-limit status.
    Status,
    /// Attempt all due queued posts now.
    Drain,
    /// List queued and failed posts.
    Queue {
        /// Remove terminally failed posts.
        #[arg(long)]
        clear_failed: bool,
    },
    /// Force a token refresh.
    Refresh,
    /// Forget the stored tokens. Queued posts are kept.
    Disconnect,
    /// Keep draining the queue in the foreground until Ctrl-C.
    Watch,
}
