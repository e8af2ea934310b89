//! Platform secret storage
//!
//! Generic keychain access used by the credential store in `auth`.

pub mod keychain;

pub use keychain::{KeychainError, KeychainProvider};
