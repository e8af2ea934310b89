//! Adapters between the CLI and infrastructure traits

mod browser;

pub use browser::ConsoleBrowserLauncher;
