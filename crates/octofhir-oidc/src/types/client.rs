//! Relying party client registrations.
//!
//! The provider reads clients through [`ClientRegistry`](crate::storage::ClientRegistry)
//! and never mutates them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

// =============================================================================
// Grant Type
// =============================================================================

/// Grant types with a built-in handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization Code flow.
    AuthorizationCode,
    /// Client Credentials flow.
    ClientCredentials,
    /// Refresh Token flow.
    RefreshToken,
}

impl GrantType {
    /// Returns the OAuth 2.0 grant_type parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Subject Type / Auth Method
// =============================================================================

/// Subject identifier type requested by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    /// The account identifier is used as `sub` for every client.
    #[default]
    Public,
    /// A per-sector `sub` is derived so clients cannot correlate users.
    Pairwise,
}

/// Token endpoint authentication methods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    /// No client authentication (public clients).
    None,

    /// Client secret via HTTP Basic Auth.
    #[default]
    ClientSecretBasic,

    /// Client secret in request body.
    ClientSecretPost,
}

impl TokenEndpointAuthMethod {
    /// Returns the string representation of the auth method.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// A registered relying party.
///
/// Field names follow the OpenID Connect Dynamic Client Registration
/// metadata so registrations can be deserialized as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Unique client identifier.
    pub client_id: String,

    /// Human-readable name shown during interaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    /// Shared secret for confidential clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Registered redirect URIs, matched exactly.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Registered post-logout redirect URIs, matched exactly.
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,

    /// Grant types this client may use at the token endpoint.
    #[serde(default = "default_grant_types")]
    pub grant_types: Vec<String>,

    /// Response types this client may request.
    #[serde(default = "default_response_types")]
    pub response_types: Vec<String>,

    /// How this client authenticates at the token endpoint.
    #[serde(default)]
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,

    /// Subject identifier type.
    #[serde(default)]
    pub subject_type: SubjectType,

    /// Explicit sector identifier for pairwise subjects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector_identifier: Option<String>,

    /// Back-channel logout endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backchannel_logout_uri: Option<String>,
}

fn default_grant_types() -> Vec<String> {
    vec![GrantType::AuthorizationCode.as_str().to_string()]
}

fn default_response_types() -> Vec<String> {
    vec!["code".to_string()]
}

impl Client {
    /// Creates a confidential client using `client_secret_basic` with the
    /// default grant and response types.
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_name: None,
            client_secret: Some(client_secret.into()),
            redirect_uris: Vec::new(),
            post_logout_redirect_uris: Vec::new(),
            grant_types: default_grant_types(),
            response_types: default_response_types(),
            token_endpoint_auth_method: TokenEndpointAuthMethod::ClientSecretBasic,
            subject_type: SubjectType::Public,
            sector_identifier: None,
            backchannel_logout_uri: None,
        }
    }

    /// Display name, `Client` when none is registered.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.client_name.as_deref().unwrap_or("Client")
    }

    /// Whether this client must not authenticate with a secret.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.token_endpoint_auth_method == TokenEndpointAuthMethod::None
    }

    /// Checks if the given redirect URI is registered for this client.
    #[must_use]
    pub fn redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    /// Checks if the given post-logout redirect URI is registered.
    #[must_use]
    pub fn post_logout_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.post_logout_redirect_uris
            .iter()
            .any(|allowed| allowed == uri)
    }

    /// Checks if the given grant type is allowed for this client.
    #[must_use]
    pub fn grant_type_allowed(&self, grant_type: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant_type)
    }

    /// Checks if the response type combination is registered, in any
    /// component order.
    #[must_use]
    pub fn response_type_allowed(&self, response_type: &str) -> bool {
        let wanted = crate::config::sorted_components(response_type);
        self.response_types
            .iter()
            .any(|rt| crate::config::sorted_components(rt) == wanted)
    }

    /// Verifies a presented secret.
    ///
    /// Both values are hashed before comparison so timing does not depend on
    /// the length of the common prefix.
    #[must_use]
    pub fn secret_matches(&self, presented: &str) -> bool {
        let Some(secret) = &self.client_secret else {
            return false;
        };
        let expected = Sha256::digest(secret.as_bytes());
        let actual = Sha256::digest(presented.as_bytes());
        expected
            .iter()
            .zip(actual.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    /// Sector identifier used for pairwise subjects: the explicit value when
    /// registered, otherwise the host of the first redirect URI.
    #[must_use]
    pub fn sector_identifier(&self) -> Option<String> {
        if let Some(sector) = &self.sector_identifier {
            return Some(sector.clone());
        }
        self.redirect_uris
            .first()
            .and_then(|uri| Url::parse(uri).ok())
            .and_then(|url| url.host_str().map(str::to_string))
    }
}
