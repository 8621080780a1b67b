//! Authorization endpoint request validation.
//!
//! Validation runs in two stages. [`RedirectTarget::resolve`] establishes
//! where errors may be sent: until the client and its `redirect_uri` are
//! known, failures are rendered to the user agent. [`AuthorizationRequest::validate`]
//! then checks everything else, and its failures are delivered to the
//! client through the response mode.

use std::collections::BTreeSet;

use crate::AuthResult;
use crate::config::ProviderConfig;
use crate::error::AuthError;
use crate::oauth::params::Params;
use crate::oauth::pkce::PkceChallengeMethod;
use crate::oauth::respond::{ResponseModes, default_response_mode};
use crate::types::{Client, ClaimsRequest};

/// Where and how authorization responses, including errors, are delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    /// Registered redirect URI.
    pub redirect_uri: String,
    /// Response mode to deliver with.
    pub response_mode: String,
    /// Opaque value echoed to the client.
    pub state: Option<String>,
}

impl RedirectTarget {
    /// Checks `redirect_uri` against the client registration.
    ///
    /// An unknown `response_mode` falls back to the default for the
    /// requested response type so the error about it can still be delivered.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if `redirect_uri` is missing
    /// - `RedirectUriMismatch` if it is not registered
    pub fn resolve(params: &Params, client: &Client, modes: &ResponseModes) -> AuthResult<Self> {
        params.require(&["redirect_uri"])?;
        let redirect_uri = params.get("redirect_uri").unwrap_or_default();
        if !client.redirect_uri_allowed(redirect_uri) {
            return Err(AuthError::RedirectUriMismatch);
        }

        let response_mode = params
            .get("response_mode")
            .filter(|mode| modes.get(mode).is_some())
            .map_or_else(
                || default_response_mode(params.get("response_type").unwrap_or("code")).to_string(),
                str::to_string,
            );

        Ok(Self {
            redirect_uri: redirect_uri.to_string(),
            response_mode,
            state: params.get("state").map(str::to_string),
        })
    }
}

/// A validated authorization request.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationRequest {
    pub client_id: String,
    pub redirect_uri: String,
    /// The `response_type` value as sent.
    pub response_type: String,
    /// Its components in request order.
    pub response_types: Vec<String>,
    pub response_mode: String,
    pub scope: String,
    pub state: Option<String>,
    pub nonce: Option<String>,
    /// Requested prompts in request order.
    pub prompts: Vec<String>,
    pub max_age: Option<u64>,
    pub acr_values: Vec<String>,
    pub claims: Option<ClaimsRequest>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<PkceChallengeMethod>,
    pub id_token_hint: Option<String>,
    pub login_hint: Option<String>,
}

impl AuthorizationRequest {
    /// Validates `params` for `client` against the provider configuration.
    ///
    /// # Errors
    ///
    /// Returns the first failed check as an OAuth error.
    pub fn validate(
        params: &Params,
        client: &Client,
        target: &RedirectTarget,
        config: &ProviderConfig,
        modes: &ResponseModes,
    ) -> AuthResult<Self> {
        params.require(&["response_type", "scope"])?;

        let response_type = params.get("response_type").unwrap_or_default();
        let response_types = check_response_type(response_type, client, config)?;
        check_response_mode(params.get("response_mode"), &response_types, modes)?;

        let prompts = check_prompt(params.get("prompt"), config)?;
        let scope = params.get("scope").unwrap_or_default();
        check_scope(scope, &prompts, config)?;

        if response_types.iter().any(|t| t == "id_token") {
            params.require(&["nonce"])?;
        }

        let max_age = params
            .get("max_age")
            .map(|value| {
                value
                    .parse::<u64>()
                    .map_err(|_| AuthError::invalid_request("invalid max_age parameter value"))
            })
            .transpose()?;

        let claims = params
            .get("claims")
            .map(|raw| {
                ClaimsRequest::parse(raw).map_err(|err| {
                    AuthError::invalid_request(format!("could not parse the claims parameter ({err})"))
                })
            })
            .transpose()?;

        let code_challenge = params.get("code_challenge").map(str::to_string);
        let code_challenge_method = match (params.get("code_challenge_method"), &code_challenge) {
            (Some(_), None) => {
                return Err(AuthError::invalid_request(
                    "code_challenge must be provided with code_challenge_method",
                ));
            }
            (Some(method), Some(_)) => Some(PkceChallengeMethod::parse(method)?),
            (None, Some(_)) => Some(PkceChallengeMethod::Plain),
            (None, None) => None,
        };

        Ok(Self {
            client_id: client.client_id.clone(),
            redirect_uri: target.redirect_uri.clone(),
            response_type: response_type.to_string(),
            response_types,
            response_mode: target.response_mode.clone(),
            scope: scope.to_string(),
            state: target.state.clone(),
            nonce: params.get("nonce").map(str::to_string),
            prompts,
            max_age,
            acr_values: split(params.get("acr_values")),
            claims,
            code_challenge,
            code_challenge_method,
            id_token_hint: params.get("id_token_hint").map(str::to_string),
            login_hint: params.get("login_hint").map(str::to_string),
        })
    }

    /// Whether `prompt` was requested.
    #[must_use]
    pub fn prompted(&self, prompt: &str) -> bool {
        self.prompts.iter().any(|p| p == prompt)
    }

    /// Whether `response_type` includes `component`.
    #[must_use]
    pub fn includes(&self, component: &str) -> bool {
        self.response_types.iter().any(|t| t == component)
    }

    /// Requested scope values.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split(' ').filter(|s| !s.is_empty())
    }
}

fn split(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(' ')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn check_response_type(
    response_type: &str,
    client: &Client,
    config: &ProviderConfig,
) -> AuthResult<Vec<String>> {
    let components = split(Some(response_type));
    let unique: BTreeSet<&String> = components.iter().collect();
    if unique.len() != components.len() {
        return Err(AuthError::invalid_request(
            "response_type must not contain duplicate values",
        ));
    }
    if components.len() > 1 && components.iter().any(|c| c == "none") {
        return Err(AuthError::unsupported_response_type(response_type));
    }
    if !config.supports_response_type(response_type) || !client.response_type_allowed(response_type)
    {
        return Err(AuthError::unsupported_response_type(response_type));
    }
    Ok(components)
}

fn check_response_mode(
    response_mode: Option<&str>,
    response_types: &[String],
    modes: &ResponseModes,
) -> AuthResult<()> {
    let Some(mode) = response_mode else {
        return Ok(());
    };
    if modes.get(mode).is_none() {
        return Err(AuthError::invalid_request(format!(
            "unsupported response_mode requested ({mode})"
        )));
    }
    let issues_tokens = response_types
        .iter()
        .any(|t| t == "token" || t == "id_token");
    if mode == "query" && issues_tokens {
        return Err(AuthError::invalid_request(
            "response_mode not allowed for this response_type",
        ));
    }
    Ok(())
}

fn check_prompt(prompt: Option<&str>, config: &ProviderConfig) -> AuthResult<Vec<String>> {
    let prompts = split(prompt);
    let unsupported: Vec<&str> = prompts
        .iter()
        .map(String::as_str)
        .filter(|p| *p != "none" && *p != "login" && !config.prompts.iter().any(|s| s == p))
        .collect();
    if !unsupported.is_empty() {
        return Err(AuthError::invalid_request(format!(
            "invalid prompt value(s) provided. ({})",
            unsupported.join(",")
        )));
    }
    if prompts.len() > 1 && prompts.iter().any(|p| p == "none") {
        return Err(AuthError::invalid_request(
            "prompt none must only be used alone",
        ));
    }
    Ok(prompts)
}

fn check_scope(scope: &str, prompts: &[String], config: &ProviderConfig) -> AuthResult<()> {
    let scopes = split(Some(scope));
    let unsupported: Vec<&str> = scopes
        .iter()
        .map(String::as_str)
        .filter(|s| !config.supports_scope(s))
        .collect();
    if !unsupported.is_empty() {
        return Err(AuthError::invalid_request(format!(
            "invalid scope value(s) provided. ({})",
            unsupported.join(",")
        )));
    }
    if !scopes.iter().any(|s| s == "openid") {
        return Err(AuthError::invalid_request("openid is required scope"));
    }
    if scopes.iter().any(|s| s == "offline_access") && !prompts.iter().any(|p| p == "consent") {
        return Err(AuthError::invalid_request(
            "offline_access scope requires consent prompt",
        ));
    }
    Ok(())
}
