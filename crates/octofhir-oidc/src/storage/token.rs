//! Token storage trait.
//!
//! Each persisted [`TokenKind`] gets its own [`TokenStore`] instance so a
//! lookup in one kind's store can never return a token of another kind.
//!
//! # Security Considerations
//!
//! - Never log token values
//! - Expiry should be enforced by the backend where possible

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::AuthResult;
use crate::error::AuthError;
use crate::types::{Token, TokenKind};

/// Storage for tokens of a single kind.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persists a token, replacing any existing token with the same `jti`.
    ///
    /// # Arguments
    ///
    /// * `token` - The token to store
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create(&self, token: &Token) -> AuthResult<()>;

    /// Finds a token by its opaque value.
    ///
    /// # Arguments
    ///
    /// * `id` - The token's `jti`
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` if the token does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find(&self, id: &str) -> AuthResult<Option<Token>>;

    /// Deletes a token. Deleting an absent token succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn destroy(&self, id: &str) -> AuthResult<()>;

    /// Marks a token consumed.
    ///
    /// The check and the write must be a single atomic step: of any number
    /// of concurrent calls for the same `id`, exactly one returns `true`.
    ///
    /// # Returns
    ///
    /// Returns `Ok(false)` if the token does not exist or was already consumed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn consume(&self, id: &str) -> AuthResult<bool>;
}

/// One [`TokenStore`] per persisted kind.
#[derive(Clone)]
pub struct TokenStores {
    stores: HashMap<TokenKind, Arc<dyn TokenStore>>,
}

impl TokenStores {
    /// Builds the registry by asking `factory` for each persisted kind.
    pub fn from_factory<F>(factory: F) -> Self
    where
        F: Fn(TokenKind) -> Arc<dyn TokenStore>,
    {
        let stores = TokenKind::PERSISTED
            .into_iter()
            .map(|kind| (kind, factory(kind)))
            .collect();
        Self { stores }
    }

    /// Returns the store for `kind`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` for kinds without a store (ID tokens).
    pub fn get(&self, kind: TokenKind) -> AuthResult<&Arc<dyn TokenStore>> {
        self.stores
            .get(&kind)
            .ok_or_else(|| AuthError::internal(format!("{kind} is not persisted")))
    }

    /// Persists `token` in its kind's store.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind has no store or the store fails.
    pub async fn save(&self, token: &Token) -> AuthResult<()> {
        self.get(token.kind)?.create(token).await
    }
}

impl std::fmt::Debug for TokenStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.stores.keys().collect();
        kinds.sort();
        f.debug_struct("TokenStores").field("kinds", &kinds).finish()
    }
}
