//! OAuth token storage layered on top of `KeychainProvider`.
//!
//! A token set is one keychain entry per account holding the whole set as
//! JSON, so a write either replaces everything or nothing.

use async_trait::async_trait;
use tern_domain::{Result, TernError};
use tracing::debug;

use crate::auth::traits::CredentialStore;
use crate::auth::types::TokenSet;
use crate::security::{KeychainError, KeychainProvider};

pub(crate) const TOKENS_PREFIX: &str = "tokens.";

pub(crate) fn tokens_key(account: &str) -> String {
    format!("{TOKENS_PREFIX}{account}")
}

impl KeychainProvider {
    /// Persist OAuth tokens in the platform keychain.
    ///
    /// # Errors
    /// Returns `KeychainError` if the entry cannot be written; the previous
    /// token set is then left as it was.
    pub fn store_tokens(
        &self,
        account: &str,
        tokens: &TokenSet,
    ) -> std::result::Result<(), KeychainError> {
        debug!(account = %account, "Storing OAuth tokens");
        self.set_secret(&tokens_key(account), &encode_tokens(tokens)?)
    }

    /// Retrieve OAuth tokens for `account`.
    ///
    /// # Errors
    /// Returns `KeychainError::NotFound` when nothing is stored and
    /// `Serialization` when the entry is corrupt.
    pub fn retrieve_tokens(&self, account: &str) -> std::result::Result<TokenSet, KeychainError> {
        debug!(account = %account, "Retrieving OAuth tokens");
        decode_tokens(&self.get_secret(&tokens_key(account))?)
    }

    /// Delete the stored token set (idempotent).
    ///
    /// # Errors
    /// Returns `KeychainError::AccessFailed` if the entry cannot be removed.
    pub fn delete_tokens(&self, account: &str) -> std::result::Result<(), KeychainError> {
        debug!(account = %account, "Deleting OAuth tokens");
        self.delete_secret(&tokens_key(account))
    }

    #[must_use]
    pub fn has_tokens(&self, account: &str) -> bool {
        self.secret_exists(&tokens_key(account))
    }

    /// Run a keychain call on the blocking pool; platform keychains may
    /// prompt or wait on a daemon.
    async fn blocking<T, F>(&self, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&KeychainProvider) -> std::result::Result<T, KeychainError> + Send + 'static,
    {
        let provider = self.clone();
        tokio::task::spawn_blocking(move || call(&provider))
            .await
            .map_err(|err| TernError::Keychain(format!("keychain task failed: {err}")))?
            .map_err(TernError::from)
    }
}

#[async_trait]
impl CredentialStore for KeychainProvider {
    async fn put(&self, account: &str, tokens: &TokenSet) -> Result<()> {
        let (account, tokens) = (account.to_string(), tokens.clone());
        self.blocking(move |keychain| keychain.store_tokens(&account, &tokens)).await
    }

    async fn get(&self, account: &str) -> Result<Option<TokenSet>> {
        let account = account.to_string();
        self.blocking(move |keychain| match keychain.retrieve_tokens(&account) {
            Ok(tokens) => Ok(Some(tokens)),
            Err(KeychainError::NotFound) => Ok(None),
            Err(err) => Err(err),
        })
        .await
    }

    async fn delete(&self, account: &str) -> Result<()> {
        let account = account.to_string();
        self.blocking(move |keychain| keychain.delete_tokens(&account)).await
    }
}

pub(crate) fn encode_tokens(tokens: &TokenSet) -> std::result::Result<String, KeychainError> {
    Ok(serde_json::to_string(tokens)?)
}

pub(crate) fn decode_tokens(raw: &str) -> std::result::Result<TokenSet, KeychainError> {
    Ok(serde_json::from_str(raw)?)
}
