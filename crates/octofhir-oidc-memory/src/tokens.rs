//! Token storage.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use octofhir_oidc::{AuthResult, Token, TokenKind, TokenStore};
use time::OffsetDateTime;
use tracing::debug;

use crate::expiring::ExpiringMap;

/// Stores tokens of one kind until their `exp`.
pub struct InMemoryTokenStore {
    kind: TokenKind,
    tokens: ExpiringMap<Token>,
}

impl InMemoryTokenStore {
    #[must_use]
    pub fn new(kind: TokenKind) -> Self {
        Self {
            kind,
            tokens: ExpiringMap::new(),
        }
    }

    /// Drops expired tokens and returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let removed = self.tokens.cleanup_expired();
        if removed > 0 {
            debug!(kind = %self.kind, removed, "expired tokens removed");
        }
        removed
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn create(&self, token: &Token) -> AuthResult<()> {
        let remaining = token.exp.saturating_sub(OffsetDateTime::now_utc().unix_timestamp());
        let ttl = Duration::from_secs(u64::try_from(remaining).unwrap_or(0));
        self.tokens.insert(token.jti.clone(), token.clone(), Some(ttl));
        Ok(())
    }

    async fn find(&self, id: &str) -> AuthResult<Option<Token>> {
        Ok(self.tokens.get(id))
    }

    async fn destroy(&self, id: &str) -> AuthResult<()> {
        self.tokens.remove(id);
        Ok(())
    }

    async fn consume(&self, id: &str) -> AuthResult<bool> {
        Ok(self
            .tokens
            .update(id, |token| !std::mem::replace(&mut token.consumed, true))
            .unwrap_or(false))
    }
}

impl std::fmt::Debug for InMemoryTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTokenStore")
            .field("kind", &self.kind)
            .field("len", &self.tokens.len())
            .finish()
    }
}

/// Token store factory for [`ProviderBuilder::token_stores`](octofhir_oidc::ProviderBuilder::token_stores).
#[must_use]
pub fn token_store(kind: TokenKind) -> Arc<dyn TokenStore> {
    Arc::new(InMemoryTokenStore::new(kind))
}
