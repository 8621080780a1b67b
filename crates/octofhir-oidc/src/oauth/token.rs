//! Token endpoint response.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Successful token endpoint response (RFC 6749 Section 5.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The issued access token.
    pub access_token: String,

    /// Always `Bearer`.
    pub token_type: String,

    /// Lifetime of the access token in seconds.
    pub expires_in: u64,

    /// Refresh token, when `offline_access` was granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// ID token, when `openid` was granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Granted scope, when it differs from what was asked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Members added by custom grant handlers.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenResponse {
    /// Creates a bearer response.
    #[must_use]
    pub fn bearer(access_token: impl Into<String>, expires_in: u64) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            expires_in,
            refresh_token: None,
            id_token: None,
            scope: None,
            extra: Map::new(),
        }
    }
}
