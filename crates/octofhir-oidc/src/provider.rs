//! The provider facade.
//!
//! [`Provider`] owns every collaborator and exposes one method per protocol
//! endpoint. Methods take already-decoded request pairs plus the session
//! cookie value and hand back transport-neutral results; mounting them on
//! HTTP routes is left to the embedding application.
//!
//! # Authorization pipeline
//!
//! 1. Load the session
//! 2. Parse parameters, resolve the client and its redirect target
//! 3. Validate the request
//! 4. Run the interaction checks; suspend, or fail with `prompt=none`
//! 5. Issue the requested artifacts and deliver them through the response mode
//! 6. Save the session, whatever happened in between
//!
//! Errors raised once the redirect target is known are delivered to the
//! client; earlier ones are returned for the user agent.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::AuthResult;
use crate::config::ProviderConfig;
use crate::context::ProviderContext;
use crate::discovery::DiscoveryDocument;
use crate::end_session::{self, LogoutPrompt};
use crate::error::AuthError;
use crate::events::{BackchannelTarget, EventBroadcaster, ProviderEvent};
use crate::grant::{GrantContext, GrantHandler, GrantRegistry};
use crate::interaction::{
    CheckContext, InteractionResult, ResumeProtocol, SuspensionRecord, decide, merge,
};
use crate::oauth::authorize::{AuthorizationRequest, RedirectTarget};
use crate::oauth::client_auth::authenticate_client;
use crate::oauth::params::{
    END_SESSION_CONFIRM_PARAMS, END_SESSION_PARAMS, Params, TOKEN_MANAGEMENT_PARAMS, accepted,
    authorization_params,
};
use crate::oauth::respond::{
    AuthorizationResponse, ResponseMode, ResponseModeHandler, ResponseModes, session_state,
    to_parameters,
};
use crate::oauth::response_types::{IssuanceContext, process_response_types};
use crate::oauth::token::TokenResponse;
use crate::session::{SessionCookie, SessionManager};
use crate::storage::{
    AccountStore, ClientRegistry, SessionStore, SuspensionTransport, TokenStore, TokenStores,
};
use crate::token::{IntrospectionResponse, Jwks, JwtService, SigningAlgorithm, SigningKeyPair, TokenLookup};
use crate::types::{Account, Session, TokenKind};

/// Maps a suspended request to the URL of the interaction UI.
pub type InteractionUrl = Arc<dyn Fn(&SuspensionRecord) -> String + Send + Sync>;

/// Outcome of an authorization or resume call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorized {
    pub response: AuthorizationResponse,
    pub cookie: SessionCookie,
}

/// Outcome of a logout request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutStarted {
    pub prompt: LogoutPrompt,
    pub cookie: SessionCookie,
}

/// Outcome of a logout confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedOut {
    pub redirect: Url,
    pub backchannel: Vec<BackchannelTarget>,
    pub cookie: SessionCookie,
}

/// An OpenID Connect provider.
pub struct Provider {
    context: Arc<ProviderContext>,
    sessions: SessionManager,
    resume: ResumeProtocol,
    grants: GrantRegistry,
    response_modes: ResponseModes,
    interaction_url: InteractionUrl,
}

impl Provider {
    /// Starts building a provider.
    #[must_use]
    pub fn builder(config: ProviderConfig) -> ProviderBuilder {
        ProviderBuilder::new(config)
    }

    /// Shared state, as handed to grant handlers.
    #[must_use]
    pub fn context(&self) -> &ProviderContext {
        &self.context
    }

    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        self.context.config()
    }

    /// Subscribes to provider events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ProviderEvent> {
        self.context.events().subscribe()
    }

    // =========================================================================
    // Authorization endpoint
    // =========================================================================

    /// Serves an authorization request.
    ///
    /// # Arguments
    ///
    /// * `pairs` - Query or form parameters
    /// * `session_id` - Value of the session cookie, if any
    ///
    /// # Errors
    ///
    /// Returns errors that must not be delivered to the client: parameter
    /// duplication before the client is known, unknown clients, unregistered
    /// redirect URIs and storage failures.
    #[instrument(skip_all)]
    pub async fn authorize<I, K, V>(
        &self,
        pairs: I,
        session_id: Option<&str>,
    ) -> AuthResult<Authorized>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let params = Params::from_pairs(pairs, &authorization_params(self.config()))
            .inspect_err(|err| self.authorization_failed(None, err))?;

        let mut session = self.sessions.load(session_id).await?;
        let outcome = self
            .authorization(&params, &mut session, &InteractionResult::default())
            .await;
        let cookie = self.sessions.save(&session).await?;
        outcome.map(|response| Authorized { response, cookie })
    }

    /// Resumes a suspended request once the interaction UI is done.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` ("authorization request has expired") when the
    /// request record is gone or tampered with, otherwise as
    /// [`authorize`](Self::authorize).
    #[instrument(skip_all, fields(uid = %uid))]
    pub async fn resume(&self, uid: &str, session_id: Option<&str>) -> AuthResult<Authorized> {
        let mut session = self.sessions.load(session_id).await?;
        let outcome = self.resumed(uid, &mut session).await;
        let cookie = self.sessions.save(&session).await?;
        outcome.map(|response| Authorized { response, cookie })
    }

    async fn resumed(&self, uid: &str, session: &mut Session) -> AuthResult<AuthorizationResponse> {
        let (record, result) = self
            .resume
            .resume(uid)
            .await
            .inspect_err(|err| self.authorization_failed(None, err))?;
        let mut params = record.params;
        merge(session, &mut params, &result);

        let client_id = params.get("client_id").unwrap_or_default().to_string();
        debug!(client_id = %client_id, "interaction ended");
        self.context.events().send(ProviderEvent::InteractionEnded {
            uid: uid.to_string(),
            client_id,
        });

        self.authorization(&params, session, &result).await
    }

    /// Reads the record of a suspended request for the interaction UI.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if the record expired.
    pub async fn interaction_details(&self, uid: &str) -> AuthResult<SuspensionRecord> {
        self.resume.details(uid).await
    }

    /// Stores what the interaction UI resolved and returns the URL that
    /// resumes the request.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if the request record expired.
    #[instrument(skip_all, fields(uid = %uid))]
    pub async fn complete_interaction(
        &self,
        uid: &str,
        result: &InteractionResult,
    ) -> AuthResult<String> {
        self.resume.complete(uid, result).await
    }

    async fn authorization(
        &self,
        params: &Params,
        session: &mut Session,
        resolved: &InteractionResult,
    ) -> AuthResult<AuthorizationResponse> {
        let mut target = None;
        match self.pipeline(params, session, resolved, &mut target).await {
            Ok(response) => Ok(response),
            Err(err) => {
                self.authorization_failed(params.get("client_id"), &err);
                match target {
                    Some(target) if err.is_redirectable() => self.deliver_error(&target, &err),
                    _ => Err(err),
                }
            }
        }
    }

    async fn pipeline(
        &self,
        params: &Params,
        session: &mut Session,
        resolved: &InteractionResult,
        target: &mut Option<RedirectTarget>,
    ) -> AuthResult<AuthorizationResponse> {
        let ctx = self.context.as_ref();
        let config = ctx.config();

        params.require(&["client_id"])?;
        let client_id = params.get("client_id").unwrap_or_default();
        let client = ctx
            .clients()
            .find(client_id)
            .await?
            .ok_or_else(|| AuthError::invalid_client("invalid client_id"))?;

        let resolved_target = RedirectTarget::resolve(params, &client, &self.response_modes)?;
        let request = AuthorizationRequest::validate(
            params,
            &client,
            target.insert(resolved_target),
            config,
            &self.response_modes,
        )?;

        let account = self.session_account(session).await?;

        let check = CheckContext {
            session,
            client: &client,
            request: &request,
            resolved,
            jwt: ctx.jwt(),
            pairwise_salt: &config.pairwise_salt,
        };
        if let Some(outcome) = decide(&check)? {
            if request.prompted("none") {
                debug!(client_id = %client.client_id, reason = %outcome.reason, "interaction forbidden");
                return Err(outcome.to_error());
            }

            let reason = outcome.reason.clone();
            let record = self.resume.suspend(params, outcome).await?;
            info!(uid = %record.uid, client_id = %client.client_id, reason = %reason, "interaction required");
            ctx.events().send(ProviderEvent::InteractionStarted {
                uid: record.uid.clone(),
                client_id: client.client_id.clone(),
                reason,
            });
            return Ok(AuthorizationResponse::Interaction {
                location: (self.interaction_url)(&record),
                uid: record.uid,
            });
        }

        let account =
            account.ok_or_else(|| AuthError::internal("session account was not resolved"))?;
        ctx.events().send(ProviderEvent::AuthorizationAccepted {
            client_id: client.client_id.clone(),
        });

        let members = process_response_types(&IssuanceContext {
            provider: ctx,
            client: &client,
            request: &request,
            session,
            account: &account,
        })
        .await?;

        let mut out = to_parameters(&members);
        if let Some(state) = &request.state {
            out.insert("state".to_string(), state.clone());
        }
        if config.features.session_management {
            out.insert(
                "session_state".to_string(),
                session_state(&client.client_id, &request.redirect_uri, session.auth_time)?,
            );
        }

        let response = self
            .mode(&request.response_mode)?
            .deliver(&request.redirect_uri, &out)?;
        info!(client_id = %client.client_id, response_type = %request.response_type, "authorization succeeded");
        ctx.events().send(ProviderEvent::AuthorizationSuccess {
            client_id: client.client_id,
            response_type: request.response_type,
        });
        Ok(response)
    }

    /// Resolves the session's account. A session bound to an account that
    /// no longer exists is reset.
    async fn session_account(&self, session: &mut Session) -> AuthResult<Option<Account>> {
        let Some(account_id) = session.account_id() else {
            return Ok(None);
        };
        let account = self.context.account(account_id).await?;
        if account.is_none() {
            warn!("session account no longer exists");
            session.account_id = None;
            session.authorizations.clear();
        }
        Ok(account)
    }

    fn mode(&self, name: &str) -> AuthResult<ResponseMode> {
        self.response_modes
            .get(name)
            .ok_or_else(|| AuthError::internal(format!("response mode {name} vanished")))
    }

    fn deliver_error(
        &self,
        target: &RedirectTarget,
        err: &AuthError,
    ) -> AuthResult<AuthorizationResponse> {
        let mut out = std::collections::BTreeMap::new();
        out.insert("error".to_string(), err.oauth_error_code().to_string());
        out.insert("error_description".to_string(), err.error_description());
        if let Some(state) = &target.state {
            out.insert("state".to_string(), state.clone());
        }
        self.mode(&target.response_mode)?
            .deliver(&target.redirect_uri, &out)
    }

    fn authorization_failed(&self, client_id: Option<&str>, err: &AuthError) {
        if err.is_server_error() {
            warn!(client_id = ?client_id, error = %err, "authorization failed");
        } else {
            debug!(client_id = ?client_id, error = %err, "authorization rejected");
        }
        self.context.events().send(ProviderEvent::AuthorizationError {
            client_id: client_id.map(str::to_string),
            error: err.oauth_error_code().to_string(),
        });
    }

    // =========================================================================
    // Back-channel endpoints
    // =========================================================================

    /// Serves a token endpoint request.
    ///
    /// # Arguments
    ///
    /// * `pairs` - Form parameters
    /// * `authorization` - Value of the HTTP `Authorization` header, if any
    ///
    /// # Errors
    ///
    /// - `InvalidClient` if client authentication fails
    /// - `UnsupportedGrantType` / `RestrictedGrantType` for grant types the
    ///   provider or the client may not use
    /// - `NotImplemented` for a supported grant type without a handler
    /// - whatever the grant handler returns
    #[instrument(skip_all)]
    pub async fn token<I, K, V>(
        &self,
        pairs: I,
        authorization: Option<&str>,
    ) -> AuthResult<TokenResponse>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let params = Params::from_pairs(pairs, self.grants.accepted_params())?;
        let result = self.exchange(&params, authorization).await;
        if let Err(err) = &result {
            debug!(grant_type = ?params.get("grant_type"), error = %err, "grant failed");
            self.context.events().send(ProviderEvent::GrantError {
                client_id: params.get("client_id").map(str::to_string),
                grant_type: params.get("grant_type").map(str::to_string),
                error: err.oauth_error_code().to_string(),
            });
        }
        result
    }

    async fn exchange(&self, params: &Params, authorization: Option<&str>) -> AuthResult<TokenResponse> {
        let ctx = self.context.as_ref();
        let client = authenticate_client(params, authorization, ctx.clients())
            .await?
            .client;

        params.require(&["grant_type"])?;
        let grant_type = params.get("grant_type").unwrap_or_default();
        if !ctx.config().supports_grant_type(grant_type) {
            return Err(AuthError::unsupported_grant_type(grant_type));
        }
        if !client.grant_type_allowed(grant_type) {
            return Err(AuthError::restricted_grant_type(grant_type));
        }
        let handler = self
            .grants
            .get(grant_type)
            .ok_or_else(|| AuthError::not_implemented("not implemented grant type"))?;

        let response = handler
            .handle(&GrantContext {
                provider: ctx,
                client: &client,
                params,
            })
            .await?;

        info!(client_id = %client.client_id, grant_type = %grant_type, "grant succeeded");
        ctx.events().send(ProviderEvent::GrantSuccess {
            client_id: client.client_id,
            grant_type: grant_type.to_string(),
        });
        Ok(response)
    }

    /// Serves a token introspection request.
    ///
    /// Unknown, expired and foreign tokens all produce `{"active":false}`.
    ///
    /// # Errors
    ///
    /// - `NotImplemented` when introspection is disabled
    /// - `InvalidClient` if client authentication fails
    /// - `InvalidRequest` if `token` is missing
    #[instrument(skip_all)]
    pub async fn introspect<I, K, V>(
        &self,
        pairs: I,
        authorization: Option<&str>,
    ) -> AuthResult<IntrospectionResponse>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        if !self.config().features.introspection {
            return Err(AuthError::not_implemented("introspection is not enabled"));
        }
        let (params, client) = self.token_management(pairs, authorization).await?;
        let hint = params.get("token_type_hint").and_then(TokenKind::from_hint);

        Ok(self
            .context
            .tokens()
            .introspect(
                params.get("token").unwrap_or_default(),
                hint,
                &client,
                &self.config().pairwise_salt,
            )
            .await)
    }

    /// Serves a token revocation request. Revoking an unknown token
    /// succeeds.
    ///
    /// # Errors
    ///
    /// - `NotImplemented` when revocation is disabled
    /// - `InvalidClient` if client authentication fails
    /// - `InvalidRequest` if `token` is missing or belongs to another client
    /// - `UnsupportedTokenType` for kinds that cannot be revoked
    #[instrument(skip_all)]
    pub async fn revoke<I, K, V>(&self, pairs: I, authorization: Option<&str>) -> AuthResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        if !self.config().features.revocation {
            return Err(AuthError::not_implemented("revocation is not enabled"));
        }
        let (params, client) = self.token_management(pairs, authorization).await?;
        let hint = params.get("token_type_hint").and_then(TokenKind::from_hint);

        let revoked = self
            .context
            .tokens()
            .revoke(params.get("token").unwrap_or_default(), hint, &client)
            .await?;
        if let Some(token) = revoked {
            info!(client_id = %client.client_id, kind = %token.kind, "token revoked");
            self.context.events().send(ProviderEvent::TokenRevoked {
                kind: token.kind,
                client_id: token.client_id,
            });
        }
        Ok(())
    }

    async fn token_management<I, K, V>(
        &self,
        pairs: I,
        authorization: Option<&str>,
    ) -> AuthResult<(Params, crate::types::Client)>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let params = Params::from_pairs(pairs, &accepted(TOKEN_MANAGEMENT_PARAMS))?;
        let client = authenticate_client(&params, authorization, self.context.clients())
            .await?
            .client;
        params.require(&["token"])?;
        Ok((params, client))
    }

    // =========================================================================
    // End session
    // =========================================================================

    /// Starts an RP-initiated logout. The returned prompt carries the xsrf
    /// value the confirmation form must post back.
    ///
    /// # Errors
    ///
    /// - `NotImplemented` when end session is disabled
    /// - `InvalidRequest` for an invalid `id_token_hint` or unregistered
    ///   `post_logout_redirect_uri`
    #[instrument(skip_all)]
    pub async fn end_session_start<I, K, V>(
        &self,
        pairs: I,
        session_id: Option<&str>,
    ) -> AuthResult<LogoutStarted>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        if !self.config().features.end_session {
            return Err(AuthError::not_implemented("end session is not enabled"));
        }
        let params = Params::from_pairs(pairs, &accepted(END_SESSION_PARAMS))?;

        let mut session = self.sessions.load(session_id).await?;
        let outcome = end_session::start(&self.context, &mut session, &params).await;
        let cookie = self.sessions.save(&session).await?;
        outcome.map(|prompt| LogoutStarted { prompt, cookie })
    }

    /// Confirms a logout started by [`end_session_start`](Self::end_session_start).
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if no logout is pending or the xsrf value is wrong.
    #[instrument(skip_all)]
    pub async fn end_session_confirm<I, K, V>(
        &self,
        pairs: I,
        session_id: Option<&str>,
    ) -> AuthResult<LoggedOut>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        if !self.config().features.end_session {
            return Err(AuthError::not_implemented("end session is not enabled"));
        }
        let params = Params::from_pairs(pairs, &accepted(END_SESSION_CONFIRM_PARAMS))?;

        let mut session = self.sessions.load(session_id).await?;
        match end_session::confirm(&self.context, &mut session, &params).await {
            Ok(outcome) => {
                let cookie = if outcome.end_session {
                    info!("session ended");
                    self.sessions.destroy(&session).await?
                } else {
                    self.sessions.save(&session).await?
                };
                Ok(LoggedOut {
                    redirect: outcome.redirect,
                    backchannel: outcome.backchannel,
                    cookie,
                })
            }
            Err(err) => {
                self.sessions.save(&session).await?;
                Err(err)
            }
        }
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// The OpenID Provider metadata document.
    ///
    /// # Errors
    ///
    /// `NotImplemented` when discovery is disabled.
    pub fn discovery(&self) -> AuthResult<DiscoveryDocument> {
        if !self.config().features.discovery {
            return Err(AuthError::not_implemented("discovery is not enabled"));
        }
        Ok(DiscoveryDocument::build(
            self.config(),
            self.response_modes.names(),
        ))
    }

    /// The public signing keys.
    #[must_use]
    pub fn jwks(&self) -> Jwks {
        self.context.jwt().jwks()
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("context", &self.context)
            .field("sessions", &self.sessions)
            .field("grants", &self.grants)
            .field("response_modes", &self.response_modes)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Assembles a [`Provider`].
///
/// Every storage collaborator is required. Without an explicit signing key
/// one is loaded from `signing.private_key_pem` or generated.
pub struct ProviderBuilder {
    config: ProviderConfig,
    signing_key: Option<SigningKeyPair>,
    token_stores: Option<TokenStores>,
    session_store: Option<Arc<dyn SessionStore>>,
    clients: Option<Arc<dyn ClientRegistry>>,
    accounts: Option<Arc<dyn AccountStore>>,
    transport: Option<Arc<dyn SuspensionTransport>>,
    events: EventBroadcaster,
    grants: GrantRegistry,
    extra_grants: Vec<(String, Arc<dyn GrantHandler>, Vec<String>)>,
    extra_modes: Vec<(String, ResponseModeHandler)>,
    interaction_url: Option<InteractionUrl>,
}

impl ProviderBuilder {
    /// Starts from `config` with the built-in grants.
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            signing_key: None,
            token_stores: None,
            session_store: None,
            clients: None,
            accounts: None,
            transport: None,
            events: EventBroadcaster::new(),
            grants: GrantRegistry::with_defaults(),
            extra_grants: Vec::new(),
            extra_modes: Vec::new(),
            interaction_url: None,
        }
    }

    #[must_use]
    pub fn signing_key(mut self, key: SigningKeyPair) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// Creates one token store per persisted kind through `factory`.
    #[must_use]
    pub fn token_stores<F>(mut self, factory: F) -> Self
    where
        F: Fn(TokenKind) -> Arc<dyn TokenStore>,
    {
        self.token_stores = Some(TokenStores::from_factory(factory));
        self
    }

    #[must_use]
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    #[must_use]
    pub fn client_registry(mut self, clients: Arc<dyn ClientRegistry>) -> Self {
        self.clients = Some(clients);
        self
    }

    #[must_use]
    pub fn account_store(mut self, accounts: Arc<dyn AccountStore>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    #[must_use]
    pub fn suspension_transport(mut self, transport: Arc<dyn SuspensionTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Publishes events on an existing broadcaster.
    #[must_use]
    pub fn events(mut self, events: EventBroadcaster) -> Self {
        self.events = events;
        self
    }

    /// Drops the built-in grants. Grant types listed in the configuration
    /// still need a handler registered through [`grant`](Self::grant).
    #[must_use]
    pub fn without_default_grants(mut self) -> Self {
        self.grants = GrantRegistry::empty();
        self
    }

    /// Registers an additional grant. Invalid or duplicate names fail
    /// [`build`](Self::build).
    #[must_use]
    pub fn grant(
        mut self,
        grant_type: impl Into<String>,
        handler: Arc<dyn GrantHandler>,
        params: &[&str],
    ) -> Self {
        self.extra_grants.push((
            grant_type.into(),
            handler,
            params.iter().map(|p| (*p).to_string()).collect(),
        ));
        self
    }

    /// Registers a custom response mode. Invalid or duplicate names fail
    /// [`build`](Self::build).
    #[must_use]
    pub fn response_mode(mut self, name: impl Into<String>, handler: ResponseModeHandler) -> Self {
        self.extra_modes.push((name.into(), handler));
        self
    }

    /// Where suspended requests send the user agent. Defaults to
    /// `{issuer}/interaction/{uid}`.
    #[must_use]
    pub fn interaction_url<F>(mut self, url: F) -> Self
    where
        F: Fn(&SuspensionRecord) -> String + Send + Sync + 'static,
    {
        self.interaction_url = Some(Arc::new(url));
        self
    }

    /// Validates the configuration and assembles the provider.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the configuration is invalid, a
    /// collaborator is missing, a registration is rejected or the signing
    /// key cannot be loaded.
    pub fn build(self) -> AuthResult<Provider> {
        let config = self.config;
        config
            .validate()
            .map_err(|e| AuthError::configuration(e.to_string()))?;

        let missing = |what: &str| AuthError::configuration(format!("{what} is required"));
        let token_stores = self.token_stores.ok_or_else(|| missing("token storage"))?;
        let session_store = self.session_store.ok_or_else(|| missing("a session store"))?;
        let clients = self.clients.ok_or_else(|| missing("a client registry"))?;
        let accounts = self.accounts.ok_or_else(|| missing("an account store"))?;
        let transport = self
            .transport
            .ok_or_else(|| missing("a suspension transport"))?;

        let mut grants = self.grants;
        for (name, handler, params) in self.extra_grants {
            let params: Vec<&str> = params.iter().map(String::as_str).collect();
            grants.register(&name, handler, &params)?;
        }
        let mut response_modes = ResponseModes::default();
        for (name, handler) in self.extra_modes {
            response_modes.register(name, handler)?;
        }

        let key = match self.signing_key {
            Some(key) => key,
            None => load_signing_key(&config)?,
        };
        let jwt = JwtService::new(key, config.issuer.clone());

        let interaction_url = self.interaction_url.unwrap_or_else(|| {
            let base = config.issuer.trim_end_matches('/').to_string();
            Arc::new(move |record: &SuspensionRecord| format!("{base}/interaction/{}", record.uid))
        });

        let sessions = SessionManager::new(session_store, &config);
        let resume = ResumeProtocol::new(&config, transport);
        let context = ProviderContext::new(
            config,
            jwt,
            TokenLookup::new(token_stores),
            clients,
            accounts,
            self.events,
        );

        info!(issuer = %context.config().issuer, "provider ready");
        Ok(Provider {
            context: Arc::new(context),
            sessions,
            resume,
            grants,
            response_modes,
            interaction_url,
        })
    }
}

fn load_signing_key(config: &ProviderConfig) -> AuthResult<SigningKeyPair> {
    let algorithm: SigningAlgorithm = config
        .signing
        .algorithm
        .parse()
        .map_err(|e: crate::token::JwtError| AuthError::configuration(e.to_string()))?;

    let key = match &config.signing.private_key_pem {
        Some(pem) => {
            let kid = config
                .signing
                .kid
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            SigningKeyPair::from_private_pem(kid, algorithm, pem)
        }
        None => {
            warn!("no signing key configured, generating an ephemeral one");
            SigningKeyPair::generate(algorithm)
        }
    };
    key.map_err(|e| AuthError::configuration(e.to_string()))
}

impl std::fmt::Debug for ProviderBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderBuilder")
            .field("issuer", &self.config.issuer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        self, MockAccountStore, MockClientRegistry, MockSessionStore, MockTokenStore,
        MockTransport,
    };
    use crate::types::Client;

    struct Fixture {
        provider: Provider,
        transport: Arc<MockTransport>,
    }

    fn fixture(config: ProviderConfig) -> Fixture {
        let mut rp = testing::client("rp");
        rp.grant_types = ["authorization_code", "refresh_token", "client_credentials"]
            .map(String::from)
            .to_vec();
        let mut public = Client::new("spa", "unused");
        public.client_secret = None;
        public.token_endpoint_auth_method = crate::types::TokenEndpointAuthMethod::None;
        public.redirect_uris = vec!["https://spa.example.com/cb".to_string()];

        let clients = Arc::new(MockClientRegistry::default());
        clients.insert(rp);
        clients.insert(public);
        let accounts = Arc::new(MockAccountStore::default());
        accounts.insert(Account::new("alice").with_claim("email", "alice@example.com"));
        let transport = Arc::new(MockTransport::default());

        let provider = Provider::builder(config)
            .signing_key(SigningKeyPair::generate(SigningAlgorithm::RS256).unwrap())
            .token_stores(|_| -> Arc<dyn TokenStore> { Arc::new(MockTokenStore::default()) })
            .session_store(Arc::new(MockSessionStore::default()))
            .client_registry(clients)
            .account_store(accounts)
            .suspension_transport(transport.clone())
            .build()
            .unwrap();
        Fixture {
            provider,
            transport,
        }
    }

    fn config() -> ProviderConfig {
        ProviderConfig::with_issuer("https://op.example.com")
    }

    const AUTHORIZE: &[(&str, &str)] = &[
        ("client_id", "rp"),
        ("redirect_uri", "https://rp.example.com/cb"),
        ("response_type", "code"),
        ("scope", "openid"),
        ("state", "xyz"),
    ];

    fn redirect_query(response: &AuthorizationResponse) -> std::collections::HashMap<String, String> {
        match response {
            AuthorizationResponse::Redirect(url) => url.query_pairs().into_owned().collect(),
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_builder_requires_stores() {
        let err = Provider::builder(config()).build().unwrap_err();
        assert!(matches!(err, AuthError::Configuration { .. }));

        let mut bad = config();
        bad.issuer = "not a url".to_string();
        let err = Provider::builder(bad).build().unwrap_err();
        assert!(matches!(err, AuthError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_login_then_consent_round_trip() {
        let fx = fixture(config());

        let first = fx.provider.authorize(AUTHORIZE.iter().copied(), None).await.unwrap();
        let AuthorizationResponse::Interaction { uid, location } = &first.response else {
            panic!("expected interaction");
        };
        assert_eq!(location, &format!("https://op.example.com/interaction/{uid}"));
        assert_eq!(
            fx.provider.interaction_details(uid).await.unwrap().outcome.reason,
            "no_session"
        );

        let result: InteractionResult = serde_json::from_value(serde_json::json!({
            "login": { "account": "alice", "remember": true },
            "consent": {}
        }))
        .unwrap();
        let return_to = fx.provider.complete_interaction(uid, &result).await.unwrap();
        assert_eq!(return_to, format!("https://op.example.com/auth/{uid}"));

        let resumed = fx
            .provider
            .resume(uid, Some(&first.cookie.value))
            .await
            .unwrap();
        let query = redirect_query(&resumed.response);
        assert!(query.contains_key("code"));
        assert_eq!(query["state"], "xyz");
        assert!(resumed.cookie.max_age.is_some());
        assert!(fx.transport.records.read().unwrap().is_empty());

        // Same session, same client: no interaction this time.
        let again = fx
            .provider
            .authorize(AUTHORIZE.iter().copied(), Some(&resumed.cookie.value))
            .await
            .unwrap();
        assert!(redirect_query(&again.response).contains_key("code"));
    }

    #[tokio::test]
    async fn test_prompt_none_without_session() {
        let fx = fixture(config());
        let mut pairs = AUTHORIZE.to_vec();
        pairs.push(("prompt", "none"));

        let out = fx.provider.authorize(pairs, None).await.unwrap();
        let query = redirect_query(&out.response);
        assert_eq!(query["error"], "login_required");
        assert_eq!(query["state"], "xyz");
        assert!(fx.transport.records.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_client_is_not_redirected() {
        let fx = fixture(config());
        let mut events = fx.provider.subscribe();
        let err = fx
            .provider
            .authorize([("client_id", "nope"), ("redirect_uri", "https://x")], None)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_client");
        assert!(matches!(
            events.try_recv().unwrap(),
            ProviderEvent::AuthorizationError { .. }
        ));

        let err = fx
            .provider
            .authorize(
                [
                    ("client_id", "rp"),
                    ("redirect_uri", "https://evil.example.com/cb"),
                ],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RedirectUriMismatch));
    }

    #[tokio::test]
    async fn test_validation_errors_are_redirected() {
        let fx = fixture(config());
        let pairs = [
            ("client_id", "rp"),
            ("redirect_uri", "https://rp.example.com/cb"),
            ("response_type", "code"),
            ("scope", "email"),
            ("state", "s1"),
        ];

        let out = fx.provider.authorize(pairs, None).await.unwrap();
        let query = redirect_query(&out.response);
        assert_eq!(query["error"], "invalid_request");
        assert_eq!(query["error_description"], "openid is required scope");
        assert_eq!(query["state"], "s1");
    }

    #[tokio::test]
    async fn test_duplicate_parameters_rejected() {
        let fx = fixture(config());
        let err = fx
            .provider
            .authorize([("scope", "openid"), ("scope", "email")], None)
            .await
            .unwrap_err();
        assert_eq!(
            err.error_description(),
            "parameters must not be provided twice. (scope)"
        );
    }

    #[tokio::test]
    async fn test_expired_resume() {
        let fx = fixture(config());
        let err = fx.provider.resume("missing", None).await.unwrap_err();
        assert_eq!(err.error_description(), "authorization request has expired");
    }

    #[tokio::test]
    async fn test_token_endpoint_dispatch() {
        let fx = fixture(config());
        let basic = format!(
            "Basic {}",
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, "rp:secret")
        );

        let err = fx
            .provider
            .token([("grant_type", "password")], Some(&basic))
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "unsupported_grant_type");

        let err = fx
            .provider
            .token([("client_id", "spa"), ("grant_type", "client_credentials")], None)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "restricted_grant_type");

        let response = fx
            .provider
            .token(
                [("grant_type", "client_credentials"), ("scope", "openid")],
                Some(&basic),
            )
            .await
            .unwrap();
        assert_eq!(response.token_type, "Bearer");

        let introspection = fx
            .provider
            .introspect([("token", response.access_token.as_str())], Some(&basic))
            .await
            .unwrap();
        assert!(introspection.active);
        assert_eq!(introspection.token_type.as_deref(), Some("client_credentials"));

        fx.provider
            .revoke([("token", response.access_token.as_str())], Some(&basic))
            .await
            .unwrap();
        let introspection = fx
            .provider
            .introspect([("token", response.access_token.as_str())], Some(&basic))
            .await
            .unwrap();
        assert!(!introspection.active);
    }

    #[tokio::test]
    async fn test_declared_grant_without_handler() {
        let mut rp = testing::client("rp");
        rp.grant_types = vec!["client_credentials".to_string()];
        let clients = Arc::new(MockClientRegistry::default());
        clients.insert(rp);

        let provider = Provider::builder(config())
            .signing_key(SigningKeyPair::generate(SigningAlgorithm::RS256).unwrap())
            .token_stores(|_| -> Arc<dyn TokenStore> { Arc::new(MockTokenStore::default()) })
            .session_store(Arc::new(MockSessionStore::default()))
            .client_registry(clients)
            .account_store(Arc::new(MockAccountStore::default()))
            .suspension_transport(Arc::new(MockTransport::default()))
            .without_default_grants()
            .build()
            .unwrap();

        let err = provider
            .token(
                [
                    ("client_id", "rp"),
                    ("client_secret", "secret"),
                    ("grant_type", "client_credentials"),
                ],
                None,
            )
            .await
            .unwrap_err();
        // rp is registered for client_secret_basic
        assert_eq!(err.oauth_error_code(), "invalid_client");

        let basic = format!(
            "Basic {}",
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, "rp:secret")
        );
        let err = provider
            .token([("grant_type", "client_credentials")], Some(&basic))
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "server_error");
        assert_eq!(err.error_description(), "not implemented grant type");
    }

    #[tokio::test]
    async fn test_disabled_features() {
        let mut config = config();
        config.features.introspection = false;
        config.features.discovery = false;
        let fx = fixture(config);

        let err = fx
            .provider
            .introspect([("token", "x")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotImplemented { .. }));
        assert!(fx.provider.discovery().is_err());
        assert_eq!(fx.provider.jwks().keys.len(), 1);
    }
}
