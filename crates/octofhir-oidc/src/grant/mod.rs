//! Token endpoint grant handlers.
//!
//! A [`GrantRegistry`] maps `grant_type` values to [`GrantHandler`]s. Each
//! registration may widen the set of parameters the token endpoint accepts;
//! anything outside that set is dropped before duplicate detection.
//!
//! # Built-in grants
//!
//! | `grant_type` | handler | extra parameters |
//! |---|---|---|
//! | `authorization_code` | [`AuthorizationCodeGrant`] | `code`, `redirect_uri`, `code_verifier` |
//! | `refresh_token` | [`RefreshTokenGrant`] | `refresh_token`, `scope` |
//! | `client_credentials` | [`ClientCredentialsGrant`] | `scope` |

pub mod authorization_code;
pub mod client_credentials;
pub mod refresh_token;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use crate::AuthResult;
use crate::context::ProviderContext;
use crate::error::AuthError;
use crate::oauth::params::{Params, TOKEN_PARAMS};
use crate::oauth::token::TokenResponse;
use crate::token::IdToken;
use crate::types::{Account, ClaimsMask, Client, Token, TokenKind};

pub use authorization_code::AuthorizationCodeGrant;
pub use client_credentials::ClientCredentialsGrant;
pub use refresh_token::RefreshTokenGrant;

/// What a grant handler gets to work with.
#[derive(Debug, Clone, Copy)]
pub struct GrantContext<'a> {
    /// Shared provider state.
    pub provider: &'a ProviderContext,
    /// The authenticated client.
    pub client: &'a Client,
    /// Whitelisted token endpoint parameters.
    pub params: &'a Params,
}

/// A token endpoint grant.
#[async_trait]
pub trait GrantHandler: Send + Sync {
    /// Exchanges the grant for tokens.
    ///
    /// The client has already been authenticated and is allowed to use this
    /// grant type.
    async fn handle(&self, ctx: &GrantContext<'_>) -> AuthResult<TokenResponse>;
}

/// Registry of grant handlers keyed by `grant_type`.
#[derive(Clone)]
pub struct GrantRegistry {
    handlers: HashMap<String, Arc<dyn GrantHandler>>,
    params: BTreeSet<String>,
}

impl GrantRegistry {
    /// A registry with no grants. Only `client_id`, `client_secret` and
    /// `grant_type` are accepted.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
            params: TOKEN_PARAMS.iter().map(|p| (*p).to_string()).collect(),
        }
    }

    /// A registry with the built-in grants.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.insert(
            "authorization_code",
            Arc::new(AuthorizationCodeGrant),
            authorization_code::PARAMS,
        );
        registry.insert(
            "refresh_token",
            Arc::new(RefreshTokenGrant),
            refresh_token::PARAMS,
        );
        registry.insert(
            "client_credentials",
            Arc::new(ClientCredentialsGrant),
            client_credentials::PARAMS,
        );
        registry
    }

    /// Registers a handler for `grant_type`.
    ///
    /// # Arguments
    ///
    /// * `grant_type` - The `grant_type` value the handler serves
    /// * `handler` - The handler
    /// * `params` - Additional token endpoint parameters the grant reads
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the name is empty, contains
    /// whitespace or is already registered.
    pub fn register(
        &mut self,
        grant_type: &str,
        handler: Arc<dyn GrantHandler>,
        params: &[&str],
    ) -> AuthResult<()> {
        if grant_type.is_empty() || grant_type.contains(char::is_whitespace) {
            return Err(AuthError::configuration(format!(
                "invalid grant type name '{grant_type}'"
            )));
        }
        if self.handlers.contains_key(grant_type) {
            return Err(AuthError::configuration(format!(
                "grant type '{grant_type}' is already registered"
            )));
        }
        self.insert(grant_type, handler, params);
        Ok(())
    }

    fn insert(&mut self, grant_type: &str, handler: Arc<dyn GrantHandler>, params: &[&str]) {
        self.handlers.insert(grant_type.to_string(), handler);
        self.params.extend(params.iter().map(|p| (*p).to_string()));
    }

    /// Looks up the handler for `grant_type`.
    #[must_use]
    pub fn get(&self, grant_type: &str) -> Option<&Arc<dyn GrantHandler>> {
        self.handlers.get(grant_type)
    }

    /// Every parameter the token endpoint accepts.
    #[must_use]
    pub fn accepted_params(&self) -> &BTreeSet<String> {
        &self.params
    }
}

impl Default for GrantRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for GrantRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("GrantRegistry")
            .field("grant_types", &names)
            .field("params", &self.params)
            .finish()
    }
}

// =============================================================================
// Shared issuance
// =============================================================================

/// Issues an access token carrying the authorization recorded in `source`
/// (a code or refresh token), limited to `scope`.
pub(crate) async fn issue_access_token(
    ctx: &GrantContext<'_>,
    source: &Token,
    scope: &str,
) -> AuthResult<Token> {
    let config = ctx.provider.config();
    let mut token = Token::new(
        TokenKind::AccessToken,
        &ctx.client.client_id,
        &config.issuer,
        config.ttl.access_token,
    )
    .with_scope(scope);
    token.account_id = source.account_id.clone();
    token.grant_id = source.grant_id.clone();
    token.claims = source.claims.clone();
    token.sid = source.sid.clone();

    ctx.provider.issue(&token).await?;
    Ok(token)
}

/// Signs an ID token for the authorization recorded in `source`, bound to
/// `access_token`.
pub(crate) fn issue_id_token(
    ctx: &GrantContext<'_>,
    source: &Token,
    scope: &str,
    account: &Account,
    access_token: &str,
) -> AuthResult<String> {
    let config = ctx.provider.config();
    let jwt = ctx.provider.jwt();

    let requested = source
        .claims
        .as_ref()
        .map(|c| c.id_token.clone())
        .unwrap_or_default();
    let scopes = scope.split(' ').filter(|s| !s.is_empty());
    let mask = ClaimsMask::new(config, scopes, &requested);

    let mut id_token = IdToken::new(account.claims(&mask));
    id_token.set("acr", source.acr.clone());
    id_token.set("auth_time", source.auth_time);
    id_token.set("nonce", source.nonce.clone());
    if config.features.backchannel_logout {
        id_token.set("sid", source.sid.clone());
    }
    id_token.bind_access_token(jwt.algorithm(), access_token);

    Ok(id_token.sign(jwt, ctx.client, &config.pairwise_salt, config.ttl.id_token)?)
}

/// Loads the account a grant refers to.
pub(crate) async fn grant_account(ctx: &GrantContext<'_>, source: &Token) -> AuthResult<Account> {
    let account_id = source
        .account_id
        .as_deref()
        .ok_or_else(|| AuthError::invalid_grant("grant has no account"))?;
    ctx.provider
        .account(account_id)
        .await?
        .ok_or_else(|| AuthError::invalid_grant("referenced account not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl GrantHandler for Noop {
        async fn handle(&self, _ctx: &GrantContext<'_>) -> AuthResult<TokenResponse> {
            Ok(TokenResponse::bearer("noop", 1))
        }
    }

    #[test]
    fn test_defaults() {
        let registry = GrantRegistry::with_defaults();
        assert!(registry.get("authorization_code").is_some());
        assert!(registry.get("refresh_token").is_some());
        assert!(registry.get("client_credentials").is_some());
        assert!(registry.get("password").is_none());

        let params = registry.accepted_params();
        for name in ["grant_type", "client_id", "code", "code_verifier", "refresh_token", "scope"] {
            assert!(params.contains(name), "{name}");
        }
        assert!(!params.contains("username"));
    }

    #[test]
    fn test_register_widens_params() {
        let mut registry = GrantRegistry::with_defaults();
        registry
            .register(
                "urn:ietf:params:oauth:grant-type:device_code",
                Arc::new(Noop),
                &["device_code"],
            )
            .unwrap();

        assert!(registry.accepted_params().contains("device_code"));
        assert!(
            registry
                .get("urn:ietf:params:oauth:grant-type:device_code")
                .is_some()
        );
    }

    #[test]
    fn test_register_rejects_bad_names() {
        let mut registry = GrantRegistry::with_defaults();

        let err = registry
            .register("refresh_token", Arc::new(Noop), &[])
            .unwrap_err();
        assert!(matches!(err, AuthError::Configuration { .. }));

        assert!(registry.register("", Arc::new(Noop), &[]).is_err());
        assert!(registry.register("two words", Arc::new(Noop), &[]).is_err());
    }

    #[test]
    fn test_empty_registry() {
        let registry = GrantRegistry::empty();
        assert!(registry.get("authorization_code").is_none());
        assert_eq!(registry.accepted_params().len(), TOKEN_PARAMS.len());
    }
}
