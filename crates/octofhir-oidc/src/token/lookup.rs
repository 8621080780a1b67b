//! Kind-agnostic token lookup shared by introspection, revocation and the
//! grant handlers.
//!
//! A presented token string carries no kind. With a `token_type_hint` the
//! hinted kind is probed first; the remaining kinds are probed concurrently
//! and the first hit wins. Token values have 256 bits of entropy, so in
//! practice at most one probe ever hits.

use std::future::Future;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tracing::{debug, warn};

use super::introspection::IntrospectionResponse;
use super::subject::subject_for;
use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::TokenStores;
use crate::types::{Client, Token, TokenKind};

/// Resolves opaque token values of unknown kind.
#[derive(Debug, Clone)]
pub struct TokenLookup {
    stores: TokenStores,
}

impl TokenLookup {
    /// Creates a lookup over `stores`.
    #[must_use]
    pub fn new(stores: TokenStores) -> Self {
        Self { stores }
    }

    /// The underlying stores.
    #[must_use]
    pub fn stores(&self) -> &TokenStores {
        &self.stores
    }

    /// Finds `value` in the store of `kind`. A record whose tag disagrees
    /// with the store is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or `kind` is not persisted.
    pub async fn find(&self, kind: TokenKind, value: &str) -> AuthResult<Option<Token>> {
        let token = self.stores.get(kind)?.find(value).await?;
        Ok(token.filter(|token| {
            if token.kind == kind {
                true
            } else {
                warn!(expected = %kind, found = %token.kind, "token store returned a foreign kind");
                false
            }
        }))
    }

    /// Locates `value` across every persisted kind.
    ///
    /// # Errors
    ///
    /// Returns the first store failure when no probe found the token.
    pub async fn locate(&self, value: &str, hint: Option<TokenKind>) -> AuthResult<Option<Token>> {
        let mut remaining = TokenKind::PERSISTED.to_vec();

        if let Some(kind) = hint.filter(|kind| remaining.contains(kind)) {
            if let Some(token) = self.find(kind, value).await? {
                return Ok(Some(token));
            }
            remaining.retain(|k| *k != kind);
        }

        first_found(remaining.into_iter().map(|kind| self.find(kind, value))).await
    }

    /// Revokes `value` on behalf of `caller`.
    ///
    /// Unknown tokens revoke successfully, and so do other clients' tokens of
    /// kinds that are never revocable. Returns the destroyed token.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if a revocable token belongs to another client
    /// - `UnsupportedTokenType` if the caller's own token is not revocable
    /// - store failures
    pub async fn revoke(
        &self,
        value: &str,
        hint: Option<TokenKind>,
        caller: &Client,
    ) -> AuthResult<Option<Token>> {
        let Some(token) = self.locate(value, hint).await? else {
            debug!(client_id = %caller.client_id, "revocation of unknown token");
            return Ok(None);
        };

        if token.client_id != caller.client_id {
            // A foreign token of a kind that cannot be revoked looks unknown.
            if !token.kind.is_revocable() {
                debug!(client_id = %caller.client_id, "revocation of unknown token");
                return Ok(None);
            }
            return Err(AuthError::invalid_request("this token does not belong to you"));
        }
        if !token.kind.is_revocable() {
            return Err(AuthError::unsupported_token_type(
                "revocation of the presented token type is not supported",
            ));
        }

        self.stores.get(token.kind)?.destroy(&token.jti).await?;
        Ok(Some(token))
    }

    /// Introspects `value` on behalf of `caller`.
    ///
    /// Never fails: unknown, expired, foreign and unreadable tokens all
    /// produce the inactive response.
    pub async fn introspect(
        &self,
        value: &str,
        hint: Option<TokenKind>,
        caller: &Client,
        pairwise_salt: &str,
    ) -> IntrospectionResponse {
        match self.try_introspect(value, hint, caller, pairwise_salt).await {
            Ok(response) => response,
            Err(err) => {
                debug!(client_id = %caller.client_id, error = %err, "introspection folded to inactive");
                IntrospectionResponse::inactive()
            }
        }
    }

    async fn try_introspect(
        &self,
        value: &str,
        hint: Option<TokenKind>,
        caller: &Client,
        pairwise_salt: &str,
    ) -> AuthResult<IntrospectionResponse> {
        let Some(token) = self.locate(value, hint).await? else {
            return Ok(IntrospectionResponse::inactive());
        };
        if token.kind.introspection_type().is_none()
            || token.is_expired()
            || token.client_id != caller.client_id
        {
            return Ok(IntrospectionResponse::inactive());
        }

        // Only the owning client gets this far, so its sector applies.
        let sub = token
            .account_id
            .as_deref()
            .map(|account_id| subject_for(account_id, caller, pairwise_salt));

        Ok(IntrospectionResponse::for_token(&token, sub))
    }
}

/// Drives `probes` concurrently and returns the first token found. The
/// remaining probes are dropped as soon as one hits.
async fn first_found<F>(probes: impl IntoIterator<Item = F>) -> AuthResult<Option<Token>>
where
    F: Future<Output = AuthResult<Option<Token>>>,
{
    let mut pending: FuturesUnordered<F> = probes.into_iter().collect();
    let mut failure = None;

    while let Some(result) = pending.next().await {
        match result {
            Ok(Some(token)) => return Ok(Some(token)),
            Ok(None) => {}
            Err(err) => {
                failure.get_or_insert(err);
            }
        }
    }

    failure.map_or(Ok(None), Err)
}
