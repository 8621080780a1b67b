//! Issued token model.
//!
//! Every persisted artifact is a [`Token`] tagged with exactly one
//! [`TokenKind`]. The opaque value handed to clients is the token's `jti`.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::claims::ClaimsRequest;

/// Closed set of token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TokenKind {
    AuthorizationCode,
    AccessToken,
    IdToken,
    RefreshToken,
    ClientCredentials,
    RegistrationAccessToken,
    InitialAccessToken,
}

impl TokenKind {
    /// Kinds that have a backing store. ID tokens are self-contained JWTs.
    pub const PERSISTED: [TokenKind; 6] = [
        Self::AuthorizationCode,
        Self::AccessToken,
        Self::RefreshToken,
        Self::ClientCredentials,
        Self::RegistrationAccessToken,
        Self::InitialAccessToken,
    ];

    /// Returns the kind name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "AuthorizationCode",
            Self::AccessToken => "AccessToken",
            Self::IdToken => "IdToken",
            Self::RefreshToken => "RefreshToken",
            Self::ClientCredentials => "ClientCredentials",
            Self::RegistrationAccessToken => "RegistrationAccessToken",
            Self::InitialAccessToken => "InitialAccessToken",
        }
    }

    /// Maps a `token_type_hint` value onto a kind.
    #[must_use]
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint {
            "access_token" => Some(Self::AccessToken),
            "refresh_token" => Some(Self::RefreshToken),
            "client_credentials" => Some(Self::ClientCredentials),
            "authorization_code" => Some(Self::AuthorizationCode),
            _ => None,
        }
    }

    /// Whether the revocation endpoint accepts this kind.
    #[must_use]
    pub fn is_revocable(&self) -> bool {
        matches!(
            self,
            Self::AccessToken | Self::ClientCredentials | Self::RefreshToken
        )
    }

    /// `token_type` reported by introspection, `None` for kinds that are
    /// never reported as active.
    #[must_use]
    pub fn introspection_type(&self) -> Option<&'static str> {
        match self {
            Self::AccessToken => Some("access_token"),
            Self::ClientCredentials => Some("client_credentials"),
            Self::RefreshToken => Some("refresh_token"),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// PKCE and redirect binding of an authorization code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBinding {
    /// Redirect URI the code was issued for.
    pub redirect_uri: String,

    /// PKCE code challenge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,

    /// PKCE code challenge method (`S256` or `plain`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,
}

/// A persisted token of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Opaque identifier, also the value given to the client.
    pub jti: String,
    pub client_id: String,
    /// Absent for client credentials tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default)]
    pub scope: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    /// Identifier shared by every artifact minted from one authorization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<ClaimsRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeBinding>,
    /// Set once a single-use token has been exchanged.
    #[serde(default)]
    pub consumed: bool,
}

impl Token {
    /// Creates a token with a fresh identifier, issued now and expiring
    /// after `ttl`.
    #[must_use]
    pub fn new(
        kind: TokenKind,
        client_id: impl Into<String>,
        iss: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let iat = OffsetDateTime::now_utc().unix_timestamp();
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        Self {
            kind,
            jti: generate_token(),
            client_id: client_id.into(),
            account_id: None,
            scope: String::new(),
            iss: iss.into(),
            iat,
            exp: iat.saturating_add(ttl),
            grant_id: None,
            sid: None,
            claims: None,
            acr: None,
            auth_time: None,
            nonce: None,
            code: None,
            consumed: false,
        }
    }

    /// Sets the account.
    #[must_use]
    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Sets the scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// The opaque value handed to clients.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.jti
    }

    /// Returns true if the token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc().unix_timestamp() >= self.exp
    }

    /// Seconds until expiry, zero once expired.
    #[must_use]
    pub fn expires_in(&self) -> u64 {
        let remaining = self.exp.saturating_sub(OffsetDateTime::now_utc().unix_timestamp());
        u64::try_from(remaining).unwrap_or(0)
    }

    /// Iterates over the space-separated scope values.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split(' ').filter(|s| !s.is_empty())
    }

    /// Whether `scope` was granted.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().any(|s| s == scope)
    }
}

/// Generate a cryptographically secure random token.
///
/// Returns a 256-bit random value encoded as base64url (43 characters).
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
