//! `refresh_token` grant.

use async_trait::async_trait;
use tracing::debug;

use super::{GrantContext, GrantHandler, grant_account, issue_access_token, issue_id_token};
use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::token::TokenResponse;
use crate::types::{Token, TokenKind, generate_token};

/// Token endpoint parameters read by this grant.
pub const PARAMS: &[&str] = &["refresh_token", "scope"];

/// Exchanges a refresh token, optionally narrowing its scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshTokenGrant;

#[async_trait]
impl GrantHandler for RefreshTokenGrant {
    async fn handle(&self, ctx: &GrantContext<'_>) -> AuthResult<TokenResponse> {
        ctx.params.require(&["refresh_token"])?;
        let value = ctx.params.get("refresh_token").unwrap_or_default();

        let tokens = ctx.provider.tokens();
        let refresh = tokens
            .find(TokenKind::RefreshToken, value)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("refresh token not found"))?;

        if refresh.is_expired() {
            return Err(AuthError::invalid_grant("refresh token is expired"));
        }
        if refresh.client_id != ctx.client.client_id {
            return Err(AuthError::invalid_grant("refresh token client mismatch"));
        }

        let scope = narrow_scope(&refresh, ctx.params.get("scope"))?;
        let account = grant_account(ctx, &refresh).await?;

        let access_token = issue_access_token(ctx, &refresh, &scope).await?;
        let mut response =
            TokenResponse::bearer(access_token.jti.clone(), access_token.expires_in());
        if scope != refresh.scope {
            response.scope = Some(scope.clone());
        }
        if scope.split(' ').any(|s| s == "openid") {
            response.id_token = Some(issue_id_token(
                ctx,
                &refresh,
                &scope,
                &account,
                &access_token.jti,
            )?);
        }

        response.refresh_token = Some(if ctx.provider.config().rotate_refresh_token {
            rotate(ctx, refresh).await?
        } else {
            refresh.jti
        });
        Ok(response)
    }
}

/// The requested scope must be a subset of what the refresh token carries.
fn narrow_scope(refresh: &Token, requested: Option<&str>) -> AuthResult<String> {
    let Some(requested) = requested else {
        return Ok(refresh.scope.clone());
    };

    let missing: Vec<&str> = requested
        .split(' ')
        .filter(|s| !s.is_empty() && !refresh.has_scope(s))
        .collect();
    if !missing.is_empty() {
        return Err(AuthError::invalid_scope(format!(
            "refresh token missing requested scope ({})",
            missing.join(",")
        )));
    }
    Ok(requested.to_string())
}

/// Replaces the refresh token with a fresh value that keeps its expiry.
async fn rotate(ctx: &GrantContext<'_>, refresh: Token) -> AuthResult<String> {
    let store = ctx.provider.tokens().stores().get(TokenKind::RefreshToken)?;
    store.destroy(&refresh.jti).await?;

    let mut rotated = refresh;
    rotated.jti = generate_token();
    ctx.provider.issue(&rotated).await?;
    debug!(client_id = %rotated.client_id, "refresh token rotated");
    Ok(rotated.jti)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::context::ProviderContext;
    use crate::oauth::params::Params;
    use crate::testing;
    use crate::types::Client;

    async fn store_refresh(provider: &ProviderContext, scope: &str) -> Token {
        let config = provider.config();
        let mut token = Token::new(
            TokenKind::RefreshToken,
            "rp",
            &config.issuer,
            config.ttl.refresh_token,
        )
        .with_account("alice")
        .with_scope(scope);
        token.nonce = Some("n-0S6".to_string());
        provider.tokens().stores().save(&token).await.unwrap();
        token
    }

    async fn exchange(
        provider: &ProviderContext,
        client: &Client,
        pairs: &[(&str, &str)],
    ) -> AuthResult<TokenResponse> {
        let params: Params = pairs.iter().copied().collect();
        RefreshTokenGrant
            .handle(&GrantContext {
                provider,
                client,
                params: &params,
            })
            .await
    }

    #[tokio::test]
    async fn test_rotation_keeps_expiry() {
        let (provider, client) = testing::populated(ProviderConfig::default());
        let refresh = store_refresh(&provider, "openid email offline_access").await;

        let response = exchange(&provider, &client, &[("refresh_token", refresh.jti.as_str())])
            .await
            .unwrap();
        let rotated_value = response.refresh_token.unwrap();
        assert_ne!(rotated_value, refresh.jti);
        assert!(response.id_token.is_some());
        assert!(response.scope.is_none());

        let tokens = provider.tokens();
        assert!(
            tokens
                .find(TokenKind::RefreshToken, &refresh.jti)
                .await
                .unwrap()
                .is_none()
        );
        let rotated = tokens
            .find(TokenKind::RefreshToken, &rotated_value)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rotated.exp, refresh.exp);
        assert_eq!(rotated.scope, refresh.scope);
    }

    #[tokio::test]
    async fn test_without_rotation() {
        let mut config = ProviderConfig::default();
        config.rotate_refresh_token = false;
        let (provider, client) = testing::populated(config);
        let refresh = store_refresh(&provider, "openid offline_access").await;

        let response = exchange(&provider, &client, &[("refresh_token", refresh.jti.as_str())])
            .await
            .unwrap();
        assert_eq!(response.refresh_token.as_deref(), Some(refresh.jti.as_str()));
    }

    #[tokio::test]
    async fn test_scope_narrowing() {
        let (provider, client) = testing::populated(ProviderConfig::default());
        let refresh = store_refresh(&provider, "openid email offline_access").await;

        let response = exchange(
            &provider,
            &client,
            &[("refresh_token", refresh.jti.as_str()), ("scope", "email")],
        )
        .await
        .unwrap();
        assert_eq!(response.scope.as_deref(), Some("email"));
        assert!(response.id_token.is_none());

        let access = provider
            .tokens()
            .find(TokenKind::AccessToken, &response.access_token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(access.scope, "email");
    }

    #[tokio::test]
    async fn test_scope_widening_rejected() {
        let (provider, client) = testing::populated(ProviderConfig::default());
        let refresh = store_refresh(&provider, "openid offline_access").await;

        let err = exchange(
            &provider,
            &client,
            &[("refresh_token", refresh.jti.as_str()), ("scope", "openid profile")],
        )
        .await
        .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_scope");
        assert_eq!(
            err.error_description(),
            "refresh token missing requested scope (profile)"
        );
    }

    #[tokio::test]
    async fn test_rejections() {
        let (provider, client) = testing::populated(ProviderConfig::default());

        let err = exchange(&provider, &client, &[("refresh_token", "unknown")])
            .await
            .unwrap_err();
        assert_eq!(err.error_description(), "refresh token not found");

        let refresh = store_refresh(&provider, "openid").await;
        let other = testing::client("other");
        let err = exchange(&provider, &other, &[("refresh_token", refresh.jti.as_str())])
            .await
            .unwrap_err();
        assert_eq!(err.error_description(), "refresh token client mismatch");

        let mut expired = store_refresh(&provider, "openid").await;
        expired.exp = expired.iat - 1;
        provider.tokens().stores().save(&expired).await.unwrap();
        let err = exchange(&provider, &client, &[("refresh_token", expired.jti.as_str())])
            .await
            .unwrap_err();
        assert_eq!(err.error_description(), "refresh token is expired");
    }

    #[tokio::test]
    async fn test_kind_checked() {
        let (provider, client) = testing::populated(ProviderConfig::default());
        let config = provider.config();
        let access = Token::new(
            TokenKind::AccessToken,
            "rp",
            &config.issuer,
            config.ttl.access_token,
        )
        .with_account("alice");
        provider.tokens().stores().save(&access).await.unwrap();

        let err = exchange(&provider, &client, &[("refresh_token", access.jti.as_str())])
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }
}
