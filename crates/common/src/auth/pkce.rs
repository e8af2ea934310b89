//! PKCE (Proof Key for Code Exchange) implementation for OAuth 2.0
//!
//! Implements RFC 7636 for secure OAuth authorization without client secrets.
//! Used for desktop applications where client secrets cannot be safely stored.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tern_domain::{Result, TernError};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Random bytes behind a verifier (43 base64url characters).
const VERIFIER_BYTES: usize = 32;
/// Random bytes behind a state nonce (128 bits, 22 base64url characters).
const STATE_BYTES: usize = 16;

pub const MIN_VERIFIER_LEN: usize = 43;
pub const MAX_VERIFIER_LEN: usize = 128;

/// Challenge method sent with every authorization request.
pub const CHALLENGE_METHOD: &str = "S256";

/// Generate a cryptographically secure code verifier
///
/// Returns 32 bytes from the OS RNG, base64url-encoded without padding.
///
/// # Errors
/// Returns `PKCEGenerationFailed` if the OS entropy source is unavailable.
pub fn generate_verifier() -> Result<String> {
    random_token(VERIFIER_BYTES)
}

/// Derive the S256 challenge: `BASE64URL(SHA256(ASCII(code_verifier)))`.
#[must_use]
pub fn derive_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Whether `verifier` satisfies RFC 7636 §4.1: 43-128 characters from
/// `[A-Za-z0-9-._~]`.
#[must_use]
pub fn is_valid_verifier(verifier: &str) -> bool {
    (MIN_VERIFIER_LEN..=MAX_VERIFIER_LEN).contains(&verifier.len())
        && verifier.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

/// Generate a random state token for CSRF protection
///
/// # Errors
/// Returns `PKCEGenerationFailed` if the OS entropy source is unavailable.
pub fn generate_state() -> Result<String> {
    random_token(STATE_BYTES)
}

/// Validate that the state token matches
///
/// Compares in constant time with respect to the content of equal-length
/// inputs.
#[must_use]
pub fn validate_state(expected: &str, actual: &str) -> bool {
    let (expected, actual) = (expected.as_bytes(), actual.as_bytes());
    if expected.len() != actual.len() {
        return false;
    }
    expected.iter().zip(actual).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

fn random_token(len: usize) -> Result<String> {
    let mut bytes = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| TernError::PKCEGenerationFailed(e.to_string()))?;
    let token = URL_SAFE_NO_PAD.encode(&bytes);
    bytes.zeroize();
    Ok(token)
}

/// PKCE verifier/challenge pair
///
/// The challenge is a pure function of the verifier. The verifier is wiped
/// from memory when the pair is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PKCEPair {
    verifier: String,
    challenge: String,
}

impl PKCEPair {
    /// Generate a fresh pair from the OS RNG.
    ///
    /// # Errors
    /// Returns `PKCEGenerationFailed` if the OS entropy source is unavailable.
    pub fn generate() -> Result<Self> {
        let verifier = generate_verifier()?;
        Ok(Self::from_verifier_unchecked(verifier))
    }

    /// Build a pair from an existing verifier.
    ///
    /// # Errors
    /// Returns `PKCEGenerationFailed` if the verifier violates RFC 7636.
    pub fn from_verifier(verifier: impl Into<String>) -> Result<Self> {
        let verifier = verifier.into();
        if !is_valid_verifier(&verifier) {
            return Err(TernError::PKCEGenerationFailed(format!(
                "verifier must be {MIN_VERIFIER_LEN}-{MAX_VERIFIER_LEN} unreserved characters"
            )));
        }
        Ok(Self::from_verifier_unchecked(verifier))
    }

    fn from_verifier_unchecked(verifier: String) -> Self {
        let challenge = derive_challenge(&verifier);
        Self { verifier, challenge }
    }

    #[must_use]
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    #[must_use]
    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    /// Get the challenge method (always "S256" for SHA256)
    #[must_use]
    pub fn challenge_method(&self) -> &'static str {
        CHALLENGE_METHOD
    }
}

impl fmt::Debug for PKCEPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PKCEPair")
            .field("verifier", &"[redacted]")
            .field("challenge", &self.challenge)
            .finish()
    }
}
