//! # Tern Domain
//!
//! Business domain types and models for Tern.
//!
//! This crate contains:
//! - Authentication and posting data types (callback results, queue items,
//!   rate-limit windows)
//! - The error taxonomy and `Result` alias shared by every crate
//! - Configuration structures
//! - Domain constants
//!
//! ## Architecture
//! - No dependencies on other Tern crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
