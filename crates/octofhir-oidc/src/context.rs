//! Shared provider state handed to grant handlers and issuance.

use std::sync::Arc;

use tracing::debug;

use crate::AuthResult;
use crate::config::ProviderConfig;
use crate::events::{EventBroadcaster, ProviderEvent};
use crate::storage::{AccountStore, ClientRegistry};
use crate::token::{JwtService, TokenLookup};
use crate::types::{Account, Token};

/// Collaborators and configuration of one provider instance.
///
/// Custom [`GrantHandler`](crate::grant::GrantHandler)s receive this through
/// their [`GrantContext`](crate::grant::GrantContext).
pub struct ProviderContext {
    config: ProviderConfig,
    jwt: JwtService,
    tokens: TokenLookup,
    clients: Arc<dyn ClientRegistry>,
    accounts: Arc<dyn AccountStore>,
    events: EventBroadcaster,
}

impl ProviderContext {
    /// Assembles a context.
    #[must_use]
    pub fn new(
        config: ProviderConfig,
        jwt: JwtService,
        tokens: TokenLookup,
        clients: Arc<dyn ClientRegistry>,
        accounts: Arc<dyn AccountStore>,
        events: EventBroadcaster,
    ) -> Self {
        Self {
            config,
            jwt,
            tokens,
            clients,
            accounts,
            events,
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    pub fn tokens(&self) -> &TokenLookup {
        &self.tokens
    }

    pub fn clients(&self) -> &dyn ClientRegistry {
        self.clients.as_ref()
    }

    pub fn accounts(&self) -> &dyn AccountStore {
        self.accounts.as_ref()
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// Persists a token and announces it.
    ///
    /// # Errors
    ///
    /// Returns an error if the token's store fails.
    pub async fn issue(&self, token: &Token) -> AuthResult<()> {
        self.tokens.stores().save(token).await?;
        debug!(kind = %token.kind, client_id = %token.client_id, "token issued");
        self.events.send(ProviderEvent::TokenIssued {
            kind: token.kind,
            client_id: token.client_id.clone(),
        });
        Ok(())
    }

    /// Resolves an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the account store fails.
    pub async fn account(&self, account_id: &str) -> AuthResult<Option<Account>> {
        self.accounts.find_by_id(account_id).await
    }
}

impl std::fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderContext")
            .field("issuer", &self.config.issuer)
            .field("jwt", &self.jwt)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}
