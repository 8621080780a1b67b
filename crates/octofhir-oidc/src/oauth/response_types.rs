//! Response type processing.
//!
//! Each component of `response_type` is issued independently and
//! concurrently; none of them mutates shared state. Once all are done the
//! ID token, if requested, is bound to its siblings (`at_hash`, then
//! `c_hash`) and only then signed.

use futures_util::future::try_join_all;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::AuthResult;
use crate::context::ProviderContext;
use crate::error::AuthError;
use crate::oauth::authorize::AuthorizationRequest;
use crate::token::IdToken;
use crate::types::{Account, ClaimsMask, Client, CodeBinding, Session, Token, TokenKind};

/// Inputs shared by every issuer of one authorization response.
#[derive(Debug, Clone, Copy)]
pub struct IssuanceContext<'a> {
    pub provider: &'a ProviderContext,
    pub client: &'a Client,
    pub request: &'a AuthorizationRequest,
    pub session: &'a Session,
    pub account: &'a Account,
}

impl IssuanceContext<'_> {
    /// The session's `sid` for the client when back-channel logout needs
    /// it bound into artifacts.
    fn bound_sid(&self) -> Option<String> {
        if !self.provider.config().features.backchannel_logout {
            return None;
        }
        self.session
            .sid_for(&self.client.client_id)
            .map(str::to_string)
    }
}

enum Issued {
    Code(Token),
    AccessToken(Token),
    IdToken(IdToken),
    Nothing,
}

/// Issues every artifact `request.response_types` asks for and returns the
/// response members (`code`, `access_token`, `token_type`, `expires_in`,
/// `id_token`).
///
/// # Errors
///
/// - `NotImplemented` for a response type without an issuer
/// - storage and signing failures
pub async fn process_response_types(ctx: &IssuanceContext<'_>) -> AuthResult<Map<String, Value>> {
    let grant_id = Uuid::new_v4().to_string();
    let issued = try_join_all(
        ctx.request
            .response_types
            .iter()
            .map(|response_type| issue(response_type, ctx, &grant_id)),
    )
    .await?;

    let mut code = None;
    let mut access_token = None;
    let mut id_token = None;
    for artifact in issued {
        match artifact {
            Issued::Code(token) => code = Some(token),
            Issued::AccessToken(token) => access_token = Some(token),
            Issued::IdToken(token) => id_token = Some(token),
            Issued::Nothing => {}
        }
    }

    let mut members = Map::new();
    if let Some(code) = &code {
        members.insert("code".to_string(), Value::String(code.jti.clone()));
    }
    if let Some(token) = &access_token {
        members.insert("access_token".to_string(), Value::String(token.jti.clone()));
        members.insert("token_type".to_string(), Value::from("Bearer"));
        members.insert("expires_in".to_string(), Value::from(token.expires_in()));
    }
    if let Some(mut id_token) = id_token {
        let jwt = ctx.provider.jwt();
        if let Some(token) = &access_token {
            id_token.bind_access_token(jwt.algorithm(), &token.jti);
        }
        if let Some(code) = &code {
            id_token.bind_code(jwt.algorithm(), &code.jti);
        }
        let config = ctx.provider.config();
        let signed = id_token.sign(jwt, ctx.client, &config.pairwise_salt, config.ttl.id_token)?;
        members.insert("id_token".to_string(), Value::String(signed));
    }

    Ok(members)
}

async fn issue(response_type: &str, ctx: &IssuanceContext<'_>, grant_id: &str) -> AuthResult<Issued> {
    match response_type {
        "code" => issue_code(ctx, grant_id).await.map(Issued::Code),
        "token" => issue_access_token(ctx, grant_id)
            .await
            .map(Issued::AccessToken),
        "id_token" => Ok(Issued::IdToken(build_id_token(ctx))),
        "none" => Ok(Issued::Nothing),
        other => Err(AuthError::not_implemented(format!(
            "response_type {other} is not implemented"
        ))),
    }
}

async fn issue_code(ctx: &IssuanceContext<'_>, grant_id: &str) -> AuthResult<Token> {
    let config = ctx.provider.config();
    let request = ctx.request;

    let mut code = Token::new(
        TokenKind::AuthorizationCode,
        &ctx.client.client_id,
        &config.issuer,
        config.ttl.authorization_code,
    )
    .with_account(&ctx.account.account_id)
    .with_scope(&request.scope);
    code.grant_id = Some(grant_id.to_string());
    code.acr = ctx.session.acr.clone();
    code.auth_time = ctx.session.auth_time;
    code.claims = request.claims.clone();
    code.nonce = request.nonce.clone();
    code.sid = ctx.bound_sid();
    code.code = Some(CodeBinding {
        redirect_uri: request.redirect_uri.clone(),
        code_challenge: request.code_challenge.clone(),
        code_challenge_method: request
            .code_challenge_method
            .map(|m| m.as_str().to_string()),
    });

    ctx.provider.issue(&code).await?;
    Ok(code)
}

async fn issue_access_token(ctx: &IssuanceContext<'_>, grant_id: &str) -> AuthResult<Token> {
    let config = ctx.provider.config();

    let mut token = Token::new(
        TokenKind::AccessToken,
        &ctx.client.client_id,
        &config.issuer,
        config.ttl.access_token,
    )
    .with_account(&ctx.account.account_id)
    .with_scope(&ctx.request.scope);
    token.grant_id = Some(grant_id.to_string());
    token.claims = ctx.request.claims.clone();
    token.sid = ctx.bound_sid();

    ctx.provider.issue(&token).await?;
    Ok(token)
}

fn build_id_token(ctx: &IssuanceContext<'_>) -> IdToken {
    let requested = ctx
        .request
        .claims
        .as_ref()
        .map(|c| c.id_token.clone())
        .unwrap_or_default();
    let mask = ClaimsMask::new(ctx.provider.config(), ctx.request.scopes(), &requested);

    let mut id_token = IdToken::new(ctx.account.claims(&mask));
    id_token.set("acr", ctx.session.acr.clone());
    id_token.set("auth_time", ctx.session.auth_time);
    id_token.set("nonce", ctx.request.nonce.clone());
    id_token.set("sid", ctx.bound_sid());
    id_token
}
