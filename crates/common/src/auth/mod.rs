//! Core OAuth 2.0 + PKCE Infrastructure
//!
//! Authorization-Code-with-PKCE flow for a desktop client talking to the X
//! API v2 authorization server.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  TokenManager    │  Token lifecycle + single-flight refresh
//! └────────┬─────────┘
//!          │
//!          ├──► OAuthClient        (authorization URL, code + refresh exchange)
//!          │         │
//!          │         └──► PKCE utilities  (verifier, challenge, state)
//!          │
//!          └──► CredentialStore    (keychain-backed persistence)
//! ```
//!
//! # Module Organization
//!
//! - **[`pkce`]**: PKCE pair generation and state validation
//! - **[`types`]**: `TokenSet`, token endpoint payloads, flow configuration
//! - **[`traits`]**: seams for the OAuth client, credential store and browser
//! - **[`client`]**: OAuth HTTP client for authorization and token exchange
//! - **[`token_manager`]**: token lifecycle management
//!
//! # Security Features
//!
//! - **PKCE**: prevents authorization code interception
//! - **State Validation**: CSRF protection, compared in constant time
//! - **Zeroization**: verifiers and pending requests are wiped on drop
//! - **Redaction**: token values never appear in `Debug` output

pub mod pkce;
pub mod types;

#[cfg(feature = "runtime")]
pub mod client;
#[cfg(feature = "platform")]
pub(crate) mod keychain;
#[cfg(feature = "runtime")]
pub mod token_manager;
#[cfg(feature = "runtime")]
pub mod traits;

#[cfg(feature = "runtime")]
pub use client::OAuthClient;
pub use pkce::{
    derive_challenge, generate_state, generate_verifier, is_valid_verifier, validate_state,
    PKCEPair,
};
#[cfg(feature = "runtime")]
pub use token_manager::TokenManager;
#[cfg(feature = "runtime")]
pub use traits::{BrowserLauncher, CredentialStore, OAuthClientTrait};
pub use types::{AuthorizationRequest, OAuthConfig, TokenResponse, TokenSet};
