//! # Tern Core
//!
//! Session and posting logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - The authentication state machine and its transition table
//! - Post validation and the durable retry queue
//! - Port interfaces (traits) implemented by `tern-infra`
//!
//! ## Architecture Principles
//! - Only depends on `tern-common` and `tern-domain`
//! - No HTTP, filesystem or platform code
//! - All external dependencies via traits

pub mod auth;
pub mod posting;

pub use auth::{
    AuthDependencies, AuthEvent, AuthenticationStateMachine, CallbackListener,
    CallbackListenerFactory, StateMachineSettings,
};
pub use posting::{
    validate_post_text, ApiResponse, DrainReport, Enqueued, PostDeliverer, PostQueue, PostingApi,
    QueueStore,
};
