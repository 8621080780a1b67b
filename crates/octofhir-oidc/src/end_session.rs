//! RP-initiated logout.
//!
//! Logout is a two-step exchange. [`start`] validates the relying party's
//! request and leaves a pending [`LogoutState`] with a random xsrf secret on
//! the session; the embedding application renders a confirmation form that
//! posts the secret back. [`confirm`] checks it and either ends the whole
//! session or only the initiating client's authorization.

use rand::RngCore;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::AuthResult;
use crate::context::ProviderContext;
use crate::discovery::END_SESSION_PATH;
use crate::error::AuthError;
use crate::events::{BackchannelTarget, ProviderEvent};
use crate::oauth::params::Params;
use crate::token::{hint_audience, validate_hint};
use crate::types::{LogoutState, Session};

/// What the confirmation form needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogoutPrompt {
    /// Where the form posts to.
    pub action: String,
    /// Value of the hidden `xsrf` field.
    pub xsrf: String,
    /// Client that initiated the logout, when it identified itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Result of a confirmed logout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutOutcome {
    /// Where to send the user agent.
    pub redirect: Url,
    /// The whole session must be destroyed rather than saved.
    pub end_session: bool,
    /// Clients to notify through back-channel logout.
    pub backchannel: Vec<BackchannelTarget>,
}

/// Validates a logout request and records it on the session.
///
/// # Errors
///
/// `InvalidRequest` if the `id_token_hint` cannot be decoded or validated,
/// or the `post_logout_redirect_uri` is not registered for the hinted
/// client.
pub async fn start(
    ctx: &ProviderContext,
    session: &mut Session,
    params: &Params,
) -> AuthResult<LogoutPrompt> {
    let config = ctx.config();
    let mut client_id = None;
    let mut redirect_uri = None;

    if let Some(hint) = params.get("id_token_hint") {
        let audience = hint_audience(ctx.jwt(), hint).map_err(|e| {
            AuthError::invalid_request(format!("could not decode id_token_hint ({e})"))
        })?;
        let client = ctx.clients().find(&audience).await?.ok_or_else(|| {
            AuthError::invalid_request(
                "could not validate id_token_hint (unrecognized azp or aud claims)",
            )
        })?;
        validate_hint(ctx.jwt(), hint, &client).map_err(|e| {
            AuthError::invalid_request(format!("could not validate id_token_hint ({e})"))
        })?;

        if let Some(uri) = params.get("post_logout_redirect_uri") {
            if !client.post_logout_redirect_uri_allowed(uri) {
                return Err(AuthError::invalid_request(
                    "post_logout_redirect_uri not registered",
                ));
            }
            redirect_uri = Some(uri.to_string());
        }
        client_id = Some(client.client_id);
    }

    let mut secret = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut secret);
    let secret = hex::encode(secret);

    session.logout = Some(LogoutState {
        secret: secret.clone(),
        client_id: client_id.clone(),
        post_logout_redirect_uri: Some(
            redirect_uri
                .or_else(|| config.post_logout_redirect_uri.clone())
                .unwrap_or_else(|| config.issuer.clone()),
        ),
        state: params.get("state").map(str::to_string),
    });
    debug!(client_id = ?client_id, "logout started");

    Ok(LogoutPrompt {
        action: format!("{}{END_SESSION_PATH}", config.issuer.trim_end_matches('/')),
        xsrf: secret,
        client_id,
    })
}

/// Completes a logout started by [`start`].
///
/// With any `logout` value the whole session ends. Otherwise only the
/// initiating client, if known, loses its authorization.
///
/// # Errors
///
/// `InvalidRequest` if no logout is pending or the xsrf secret does not
/// match.
pub async fn confirm(
    ctx: &ProviderContext,
    session: &mut Session,
    params: &Params,
) -> AuthResult<LogoutOutcome> {
    let pending = session
        .logout
        .take()
        .ok_or_else(|| AuthError::invalid_request("could not find logout details"))?;
    if params.get("xsrf") != Some(pending.secret.as_str()) {
        session.logout = Some(pending);
        return Err(AuthError::invalid_request("xsrf token invalid"));
    }

    let end_session = params.contains("logout");
    let mut backchannel = Vec::new();
    if end_session {
        if ctx.config().features.backchannel_logout {
            backchannel = backchannel_targets(ctx, session).await;
        }
    } else if let Some(client_id) = &pending.client_id {
        session.unbind_client(client_id);
    }

    let target = pending
        .post_logout_redirect_uri
        .as_deref()
        .unwrap_or(&ctx.config().issuer);
    let mut redirect = Url::parse(target)
        .map_err(|e| AuthError::internal(format!("invalid post logout redirect: {e}")))?;
    if let Some(state) = &pending.state {
        redirect.query_pairs_mut().append_pair("state", state);
    }

    ctx.events().send(ProviderEvent::EndSessionSuccess {
        client_id: pending.client_id.clone(),
        account_id: session.account_id.clone(),
        backchannel: backchannel.clone(),
    });

    Ok(LogoutOutcome {
        redirect,
        end_session,
        backchannel,
    })
}

/// Every client authorized under the session that registered a
/// back-channel logout URI. Registry failures only skip the client.
async fn backchannel_targets(ctx: &ProviderContext, session: &Session) -> Vec<BackchannelTarget> {
    let mut targets = Vec::new();
    for (client_id, sid) in &session.authorizations {
        match ctx.clients().find(client_id).await {
            Ok(Some(client)) if client.backchannel_logout_uri.is_some() => {
                targets.push(BackchannelTarget {
                    client_id: client_id.clone(),
                    sid: sid.clone(),
                });
            }
            Ok(_) => {}
            Err(err) => warn!(client_id = %client_id, error = %err, "skipping back-channel logout"),
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::testing::{self, MockAccountStore, MockClientRegistry};
    use crate::token::IdToken;
    use crate::types::{Account, Client};
    use std::sync::Arc;

    struct Fixture {
        ctx: ProviderContext,
        rp: Client,
        session: Session,
    }

    impl Fixture {
        fn new(config: ProviderConfig) -> Self {
            let mut rp = testing::client("rp");
            rp.post_logout_redirect_uris = vec!["https://rp.example.com/bye".to_string()];
            rp.backchannel_logout_uri = Some("https://rp.example.com/bc".to_string());
            let other = testing::client("other");

            let clients = Arc::new(MockClientRegistry::default());
            clients.insert(rp.clone());
            clients.insert(other);
            let accounts = Arc::new(MockAccountStore::default());
            accounts.insert(Account::new("alice"));

            let mut session = Session::new();
            session.bind_account("alice");
            session.bind_sid("rp", "sid-rp");
            session.bind_sid("other", "sid-other");

            Self {
                ctx: testing::context_with(config, clients, accounts),
                rp,
                session,
            }
        }

        fn hint(&self) -> String {
            let mut claims = serde_json::Map::new();
            claims.insert("sub".to_string(), "alice".into());
            let config = self.ctx.config();
            IdToken::new(claims)
                .sign(self.ctx.jwt(), &self.rp, &config.pairwise_salt, config.ttl.id_token)
                .unwrap()
        }
    }

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_logout_everywhere() {
        let mut config = ProviderConfig::with_issuer("https://op.example.com");
        config.features.backchannel_logout = true;
        let mut fx = Fixture::new(config);
        let hint = fx.hint();

        let prompt = start(
            &fx.ctx,
            &mut fx.session,
            &params(&[
                ("id_token_hint", hint.as_str()),
                ("post_logout_redirect_uri", "https://rp.example.com/bye"),
                ("state", "af0ifjsldkj"),
            ]),
        )
        .await
        .unwrap();
        assert_eq!(prompt.action, "https://op.example.com/session/end");
        assert_eq!(prompt.xsrf.len(), 48);
        assert_eq!(prompt.client_id.as_deref(), Some("rp"));

        let mut events = fx.ctx.events().subscribe();
        let outcome = confirm(
            &fx.ctx,
            &mut fx.session,
            &params(&[("xsrf", prompt.xsrf.as_str()), ("logout", "yes")]),
        )
        .await
        .unwrap();

        assert!(outcome.end_session);
        assert_eq!(
            outcome.redirect.as_str(),
            "https://rp.example.com/bye?state=af0ifjsldkj"
        );
        assert_eq!(
            outcome.backchannel,
            vec![BackchannelTarget {
                client_id: "rp".to_string(),
                sid: "sid-rp".to_string(),
            }]
        );
        assert!(matches!(
            events.try_recv().unwrap(),
            ProviderEvent::EndSessionSuccess { .. }
        ));
    }

    #[tokio::test]
    async fn test_logout_single_client() {
        let mut fx = Fixture::new(ProviderConfig::with_issuer("https://op.example.com"));
        let hint = fx.hint();

        let prompt = start(&fx.ctx, &mut fx.session, &params(&[("id_token_hint", hint.as_str())]))
            .await
            .unwrap();
        let outcome = confirm(&fx.ctx, &mut fx.session, &params(&[("xsrf", prompt.xsrf.as_str())]))
            .await
            .unwrap();

        assert!(!outcome.end_session);
        assert!(outcome.backchannel.is_empty());
        assert_eq!(outcome.redirect.as_str(), "https://op.example.com/");
        assert!(fx.session.sid_for("rp").is_none());
        assert_eq!(fx.session.sid_for("other"), Some("sid-other"));
        assert!(fx.session.logout.is_none());
    }

    #[tokio::test]
    async fn test_redirect_dropped_without_hint() {
        let mut config = ProviderConfig::with_issuer("https://op.example.com");
        config.post_logout_redirect_uri = Some("https://op.example.com/logged-out".to_string());
        let mut fx = Fixture::new(config);

        start(
            &fx.ctx,
            &mut fx.session,
            &params(&[("post_logout_redirect_uri", "https://evil.example.com")]),
        )
        .await
        .unwrap();

        let logout = fx.session.logout.clone().unwrap();
        assert!(logout.client_id.is_none());
        assert_eq!(
            logout.post_logout_redirect_uri.as_deref(),
            Some("https://op.example.com/logged-out")
        );
    }

    #[tokio::test]
    async fn test_unregistered_redirect_with_hint() {
        let mut fx = Fixture::new(ProviderConfig::default());
        let hint = fx.hint();

        let err = start(
            &fx.ctx,
            &mut fx.session,
            &params(&[
                ("id_token_hint", hint.as_str()),
                ("post_logout_redirect_uri", "https://evil.example.com"),
            ]),
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_description(), "post_logout_redirect_uri not registered");
    }

    #[tokio::test]
    async fn test_bad_hint() {
        let mut fx = Fixture::new(ProviderConfig::default());

        let err = start(&fx.ctx, &mut fx.session, &params(&[("id_token_hint", "garbage")]))
            .await
            .unwrap_err();
        assert!(err.error_description().starts_with("could not decode id_token_hint"));
    }

    #[tokio::test]
    async fn test_confirm_checks() {
        let mut fx = Fixture::new(ProviderConfig::default());

        let err = confirm(&fx.ctx, &mut fx.session, &params(&[("xsrf", "x")]))
            .await
            .unwrap_err();
        assert_eq!(err.error_description(), "could not find logout details");

        start(&fx.ctx, &mut fx.session, &Params::default()).await.unwrap();
        let err = confirm(&fx.ctx, &mut fx.session, &params(&[("xsrf", "wrong")]))
            .await
            .unwrap_err();
        assert_eq!(err.error_description(), "xsrf token invalid");
        assert!(fx.session.logout.is_some());
    }
}
