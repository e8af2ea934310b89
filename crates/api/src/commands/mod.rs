//! CLI commands - thin wrappers over the state machine

mod auth;
mod posting;
mod status;
mod watch;

pub use auth::*;
pub use posting::*;
pub use status::*;
pub use watch::*;
