//! OpenID Provider metadata.
//!
//! Endpoint paths are fixed relative to the issuer; an embedding transport
//! mounts the provider's operations under the same paths so the advertised
//! URLs resolve.
//!
//! # References
//!
//! - [OpenID Connect Discovery 1.0](https://openid.net/specs/openid-connect-discovery-1_0.html)

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;

/// Authorization endpoint. Resumed requests live at `{AUTHORIZATION_PATH}/{uid}`.
pub const AUTHORIZATION_PATH: &str = "/auth";
pub const TOKEN_PATH: &str = "/token";
pub const JWKS_PATH: &str = "/certs";
pub const INTROSPECTION_PATH: &str = "/token/introspection";
pub const REVOCATION_PATH: &str = "/token/revocation";
pub const END_SESSION_PATH: &str = "/session/end";
pub const CHECK_SESSION_PATH: &str = "/session/check";

/// Provider metadata served at `/.well-known/openid-configuration`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introspection_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_session_iframe: Option<String>,

    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub response_modes_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub acr_values_supported: Vec<String>,
    pub claims_supported: Vec<String>,
    pub claims_parameter_supported: bool,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backchannel_logout_supported: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backchannel_logout_session_supported: Option<bool>,
}

impl DiscoveryDocument {
    /// Builds the document.
    ///
    /// # Arguments
    ///
    /// * `config` - The provider configuration
    /// * `response_modes` - Every response mode the provider can deliver,
    ///   including registered custom modes
    #[must_use]
    pub fn build(config: &ProviderConfig, response_modes: Vec<String>) -> Self {
        let base = config.issuer.trim_end_matches('/');
        let url = |path: &str| format!("{base}{path}");
        let features = &config.features;

        let claims_supported: BTreeSet<String> = config
            .claims
            .values()
            .flatten()
            .cloned()
            .chain(["sub".to_string(), "acr".to_string(), "auth_time".to_string()])
            .chain(features.backchannel_logout.then(|| "sid".to_string()))
            .collect();

        Self {
            issuer: config.issuer.clone(),
            authorization_endpoint: url(AUTHORIZATION_PATH),
            token_endpoint: url(TOKEN_PATH),
            jwks_uri: url(JWKS_PATH),
            introspection_endpoint: features.introspection.then(|| url(INTROSPECTION_PATH)),
            revocation_endpoint: features.revocation.then(|| url(REVOCATION_PATH)),
            end_session_endpoint: features.end_session.then(|| url(END_SESSION_PATH)),
            check_session_iframe: features
                .session_management
                .then(|| url(CHECK_SESSION_PATH)),
            scopes_supported: config.scopes.clone(),
            response_types_supported: config.response_types.clone(),
            response_modes_supported: response_modes,
            grant_types_supported: config.grant_types.clone(),
            subject_types_supported: config.subject_types.clone(),
            acr_values_supported: config.acr_values.clone(),
            claims_supported: claims_supported.into_iter().collect(),
            claims_parameter_supported: features.claims_parameter,
            id_token_signing_alg_values_supported: vec![config.signing.algorithm.clone()],
            token_endpoint_auth_methods_supported: [
                "none",
                "client_secret_basic",
                "client_secret_post",
            ]
            .map(String::from)
            .to_vec(),
            code_challenge_methods_supported: vec!["S256".to_string(), "plain".to_string()],
            backchannel_logout_supported: features.backchannel_logout.then_some(true),
            backchannel_logout_session_supported: features.backchannel_logout.then_some(true),
        }
    }
}
