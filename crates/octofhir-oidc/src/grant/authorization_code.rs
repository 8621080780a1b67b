//! `authorization_code` grant.

use async_trait::async_trait;
use tracing::warn;

use super::{GrantContext, GrantHandler, grant_account, issue_access_token, issue_id_token};
use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::pkce::{self, PkceChallengeMethod};
use crate::oauth::token::TokenResponse;
use crate::types::{Token, TokenKind};

/// Token endpoint parameters read by this grant.
pub const PARAMS: &[&str] = &["code", "redirect_uri", "code_verifier"];

/// Exchanges a single-use authorization code.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationCodeGrant;

#[async_trait]
impl GrantHandler for AuthorizationCodeGrant {
    async fn handle(&self, ctx: &GrantContext<'_>) -> AuthResult<TokenResponse> {
        ctx.params.require(&["code", "redirect_uri"])?;
        let value = ctx.params.get("code").unwrap_or_default();
        let redirect_uri = ctx.params.get("redirect_uri").unwrap_or_default();

        let tokens = ctx.provider.tokens();
        let code = tokens
            .find(TokenKind::AuthorizationCode, value)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("authorization code not found"))?;

        if code.is_expired() {
            return Err(AuthError::invalid_grant("authorization code is expired"));
        }
        if code.consumed {
            return Err(replayed(ctx, &code).await);
        }
        if code.client_id != ctx.client.client_id {
            return Err(AuthError::invalid_grant("authorization code client mismatch"));
        }

        let binding = code.code.clone().unwrap_or_default();
        if binding.redirect_uri != redirect_uri {
            return Err(AuthError::invalid_grant(
                "authorization code redirect_uri mismatch",
            ));
        }
        check_pkce(
            binding.code_challenge.as_deref(),
            binding.code_challenge_method.as_deref(),
            ctx.params.get("code_verifier"),
        )?;

        // Claimed after every check; a failed exchange leaves the code redeemable.
        if !tokens
            .stores()
            .get(TokenKind::AuthorizationCode)?
            .consume(&code.jti)
            .await?
        {
            return Err(replayed(ctx, &code).await);
        }

        let account = grant_account(ctx, &code).await?;
        let access_token = issue_access_token(ctx, &code, &code.scope).await?;

        let mut response =
            TokenResponse::bearer(access_token.jti.clone(), access_token.expires_in());
        if code.has_scope("openid") {
            response.id_token = Some(issue_id_token(
                ctx,
                &code,
                &code.scope,
                &account,
                &access_token.jti,
            )?);
        }
        if code.has_scope("offline_access") && ctx.client.grant_type_allowed("refresh_token") {
            response.refresh_token = Some(issue_refresh_token(ctx, &code).await?.jti);
        }
        Ok(response)
    }
}

/// A consumed code is presented again: the code is destroyed so it can
/// never be redeemed.
async fn replayed(ctx: &GrantContext<'_>, code: &Token) -> AuthError {
    warn!(client_id = %code.client_id, "authorization code replay");
    let store = match ctx.provider.tokens().stores().get(TokenKind::AuthorizationCode) {
        Ok(store) => store,
        Err(err) => return err,
    };
    if let Err(err) = store.destroy(&code.jti).await {
        return err;
    }
    AuthError::invalid_grant("authorization code already consumed")
}

fn check_pkce(
    challenge: Option<&str>,
    method: Option<&str>,
    verifier: Option<&str>,
) -> AuthResult<()> {
    let failed = || AuthError::invalid_grant("PKCE verification failed");
    match (challenge, verifier) {
        (None, None) => Ok(()),
        (Some(challenge), Some(verifier)) => {
            let method = method
                .map(PkceChallengeMethod::parse)
                .transpose()
                .map_err(|_| failed())?
                .unwrap_or_default();
            if pkce::verify(challenge, method, verifier) {
                Ok(())
            } else {
                Err(failed())
            }
        }
        _ => Err(failed()),
    }
}

/// The refresh token inherits everything the code recorded so later ID
/// tokens carry the same authentication context.
async fn issue_refresh_token(ctx: &GrantContext<'_>, code: &Token) -> AuthResult<Token> {
    let config = ctx.provider.config();
    let mut token = Token::new(
        TokenKind::RefreshToken,
        &ctx.client.client_id,
        &config.issuer,
        config.ttl.refresh_token,
    )
    .with_scope(&code.scope);
    token.account_id = code.account_id.clone();
    token.grant_id = code.grant_id.clone();
    token.claims = code.claims.clone();
    token.sid = code.sid.clone();
    token.acr = code.acr.clone();
    token.auth_time = code.auth_time;
    token.nonce = code.nonce.clone();

    ctx.provider.issue(&token).await?;
    Ok(token)
}
