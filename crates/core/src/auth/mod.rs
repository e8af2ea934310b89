//! Authentication session orchestration
//!
//! - **[`transitions`]**: the legal state transition table
//! - **[`state_machine`]**: commands, state publication and the drain worker
//! - **[`ports`]**: the loopback callback listener seam

pub mod ports;
pub mod state_machine;
pub mod transitions;

pub use ports::{CallbackListener, CallbackListenerFactory};
pub use state_machine::{AuthDependencies, AuthenticationStateMachine, StateMachineSettings};
pub use transitions::{next_state, AuthEvent};
