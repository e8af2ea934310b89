//! # Tern Infrastructure
//!
//! Infrastructure implementations of the `tern-core` ports.
//!
//! This crate contains:
//! - The X API v2 client (`POST /2/tweets`, `GET /2/users/me`)
//! - The loopback OAuth redirect server and system browser launcher
//! - JSON-file persistence for the post retry queue
//! - Configuration loading and logging setup
//!
//! ## Architecture
//! - Implements traits defined in `tern-core` and `tern-common`
//! - Contains all "impure" code (sockets, files, processes)

pub mod config;
pub mod errors;
pub mod http;
pub mod integrations;
pub mod observability;
pub mod persistence;

pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder};
pub use integrations::x::{
    LoopbackCallbackServer, LoopbackListenerFactory, LoopbackSettings, SystemBrowserLauncher,
    XApiClient,
};
pub use observability::init_logging;
pub use persistence::{JsonQueueStore, MemoryQueueStore};
