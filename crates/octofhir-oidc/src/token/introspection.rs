//! Token introspection response (RFC 7662).
//!
//! # Security Considerations
//!
//! - Never reveal why a token is inactive (unknown, expired, foreign, or a
//!   lookup failure all look the same)
//! - Always return valid JSON

use serde::{Deserialize, Serialize};

use crate::types::Token;

/// Token introspection response.
///
/// An inactive response serializes to exactly `{"active":false}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    /// Whether the token is currently active.
    pub active: bool,

    /// `access_token`, `client_credentials` or `refresh_token`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Client the token was issued to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Subject as seen by the token's client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Space-separated granted scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Expiration time (Unix timestamp).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issued at time (Unix timestamp).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Issuer of the token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Token identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Session the token was issued under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

impl IntrospectionResponse {
    /// The inert negative response.
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }

    /// Describes an active token. Returns the inactive response for kinds
    /// that introspection does not report.
    #[must_use]
    pub fn for_token(token: &Token, sub: Option<String>) -> Self {
        let Some(token_type) = token.kind.introspection_type() else {
            return Self::inactive();
        };
        Self {
            active: true,
            token_type: Some(token_type.to_string()),
            client_id: Some(token.client_id.clone()),
            sub,
            scope: Some(token.scope.clone()),
            exp: Some(token.exp),
            iat: Some(token.iat),
            iss: Some(token.iss.clone()),
            jti: Some(token.jti.clone()),
            sid: token.sid.clone(),
        }
    }
}
