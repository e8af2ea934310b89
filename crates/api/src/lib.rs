//! # Tern App
//!
//! Application layer: dependency wiring and the `tern` command line.
//!
//! This crate contains:
//! - Application context (dependency injection)
//! - Commands (authenticate, post, status, queue maintenance)
//! - CLI argument parsing and the main entry point
//!
//! ## Architecture
//! - Depends on `common`, `core`, and `infra`
//! - Wires up the hexagonal architecture

pub mod adapters;
pub mod cli;
pub mod commands;
pub mod context;
pub mod utils;

pub use context::AppContext;
