//! `client_credentials` grant.

use async_trait::async_trait;

use super::{GrantContext, GrantHandler};
use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::token::TokenResponse;
use crate::types::{Token, TokenKind};

/// Token endpoint parameters read by this grant.
pub const PARAMS: &[&str] = &["scope"];

/// Issues a token for the client itself, with no End-User involved.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientCredentialsGrant;

#[async_trait]
impl GrantHandler for ClientCredentialsGrant {
    async fn handle(&self, ctx: &GrantContext<'_>) -> AuthResult<TokenResponse> {
        let config = ctx.provider.config();
        let scope = ctx.params.get("scope").unwrap_or_default();

        let unsupported: Vec<&str> = scope
            .split(' ')
            .filter(|s| !s.is_empty() && !config.supports_scope(s))
            .collect();
        if !unsupported.is_empty() {
            return Err(AuthError::invalid_scope(format!(
                "invalid scope value(s) provided. ({})",
                unsupported.join(",")
            )));
        }

        let token = Token::new(
            TokenKind::ClientCredentials,
            &ctx.client.client_id,
            &config.issuer,
            config.ttl.client_credentials,
        )
        .with_scope(scope);
        ctx.provider.issue(&token).await?;

        Ok(TokenResponse::bearer(token.jti.clone(), token.expires_in()))
    }
}
