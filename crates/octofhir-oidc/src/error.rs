//! Provider error types.
//!
//! Errors are organised by the protocol error code they surface as, not by
//! the component that produced them. Every variant maps to exactly one
//! OAuth 2.0 / OpenID Connect `error` value via [`AuthError::oauth_error_code`].

use std::fmt;

use crate::token::jwt::JwtError;

/// Errors that can occur while serving authorization, token, introspection,
/// revocation and end-session requests.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request is missing a parameter, repeats one, or is otherwise malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// The client is unknown or failed to authenticate.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client is invalid.
        message: String,
    },

    /// The authorization grant or refresh token is invalid, expired, or consumed.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Description of why the grant is invalid.
        message: String,
    },

    /// The requested scope is invalid, unknown, or exceeds the original grant.
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Description of why the scope is invalid.
        message: String,
    },

    /// A presented token could not be used.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// End-User authentication is required but interaction is forbidden.
    #[error("Login required: {description}")]
    LoginRequired {
        /// Human-readable description forwarded to the client.
        description: String,
    },

    /// End-User consent is required but interaction is forbidden.
    #[error("Consent required: {description}")]
    ConsentRequired {
        /// Human-readable description forwarded to the client.
        description: String,
    },

    /// Some other End-User interaction is required but forbidden.
    #[error("Interaction required: {description}")]
    InteractionRequired {
        /// Human-readable description forwarded to the client.
        description: String,
    },

    /// The resource owner or the provider denied the request.
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Description of why access was denied.
        message: String,
    },

    /// The `redirect_uri` is not registered for the client.
    #[error("redirect_uri did not match any client's registered redirect_uri")]
    RedirectUriMismatch,

    /// The provider does not support the requested response type.
    #[error("Unsupported response type: {response_type}")]
    UnsupportedResponseType {
        /// The unsupported response type.
        response_type: String,
    },

    /// The provider does not support the requested grant type.
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The unsupported grant type.
        grant_type: String,
    },

    /// The client is not allowed to use the requested grant type.
    #[error("Restricted grant type: {grant_type}")]
    RestrictedGrantType {
        /// The grant type the client attempted to use.
        grant_type: String,
    },

    /// The presented token kind cannot be revoked.
    #[error("Unsupported token type: {message}")]
    UnsupportedTokenType {
        /// Description of the unsupported token kind.
        message: String,
    },

    /// A storage collaborator failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The provider configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// A declared feature has no implementation registered.
    #[error("Not implemented: {message}")]
    NotImplemented {
        /// What is missing.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `AccessDenied` error.
    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedResponseType` error.
    #[must_use]
    pub fn unsupported_response_type(response_type: impl Into<String>) -> Self {
        Self::UnsupportedResponseType {
            response_type: response_type.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `RestrictedGrantType` error.
    #[must_use]
    pub fn restricted_grant_type(grant_type: impl Into<String>) -> Self {
        Self::RestrictedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `UnsupportedTokenType` error.
    #[must_use]
    pub fn unsupported_token_type(message: impl Into<String>) -> Self {
        Self::UnsupportedTokenType {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `NotImplemented` error.
    #[must_use]
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::NotImplemented {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Builds the error surfaced to the client for an interaction outcome
    /// when the request forbids interaction (`prompt=none`).
    #[must_use]
    pub fn from_interaction(error: &str, description: impl Into<String>) -> Self {
        let description = description.into();
        match error {
            "login_required" => Self::LoginRequired { description },
            "consent_required" => Self::ConsentRequired { description },
            _ => Self::InteractionRequired { description },
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. }
                | Self::Configuration { .. }
                | Self::NotImplemented { .. }
                | Self::Internal { .. }
        )
    }

    /// Returns `true` if the error may be delivered to the client's
    /// `redirect_uri`. Client and redirect URI failures must be rendered to
    /// the user agent instead.
    #[must_use]
    pub fn is_redirectable(&self) -> bool {
        !matches!(self, Self::InvalidClient { .. } | Self::RedirectUriMismatch)
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRequest { .. }
            | Self::RedirectUriMismatch
            | Self::UnsupportedResponseType { .. }
            | Self::UnsupportedGrantType { .. }
            | Self::UnsupportedTokenType { .. } => ErrorCategory::Validation,
            Self::InvalidClient { .. } | Self::InvalidGrant { .. } => {
                ErrorCategory::Authentication
            }
            Self::InvalidScope { .. }
            | Self::AccessDenied { .. }
            | Self::RestrictedGrantType { .. } => ErrorCategory::Authorization,
            Self::InvalidToken { .. } => ErrorCategory::Token,
            Self::LoginRequired { .. }
            | Self::ConsentRequired { .. }
            | Self::InteractionRequired { .. } => ErrorCategory::Interaction,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::NotImplemented { .. } | Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::InvalidClient { .. } => "invalid_client",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::InvalidToken { .. } => "invalid_token",
            Self::LoginRequired { .. } => "login_required",
            Self::ConsentRequired { .. } => "consent_required",
            Self::InteractionRequired { .. } => "interaction_required",
            Self::AccessDenied { .. } => "access_denied",
            Self::RedirectUriMismatch => "redirect_uri_mismatch",
            Self::UnsupportedResponseType { .. } => "unsupported_response_type",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::RestrictedGrantType { .. } => "restricted_grant_type",
            Self::UnsupportedTokenType { .. } => "unsupported_token_type",
            Self::Storage { .. }
            | Self::Configuration { .. }
            | Self::NotImplemented { .. }
            | Self::Internal { .. } => "server_error",
        }
    }

    /// Returns the `error_description` exposed to clients.
    ///
    /// Server-side failures are not described in detail.
    #[must_use]
    pub fn error_description(&self) -> String {
        match self {
            Self::InvalidRequest { message }
            | Self::InvalidClient { message }
            | Self::InvalidGrant { message }
            | Self::InvalidScope { message }
            | Self::InvalidToken { message }
            | Self::AccessDenied { message }
            | Self::UnsupportedTokenType { message } => message.clone(),
            Self::LoginRequired { description }
            | Self::ConsentRequired { description }
            | Self::InteractionRequired { description } => description.clone(),
            Self::RedirectUriMismatch => self.to_string(),
            Self::UnsupportedResponseType { response_type } => {
                format!("unsupported response_type requested ({response_type})")
            }
            Self::UnsupportedGrantType { grant_type } => {
                format!("unsupported grant_type requested ({grant_type})")
            }
            Self::RestrictedGrantType { .. } => {
                "requested grant type is restricted to this client".to_string()
            }
            Self::NotImplemented { message } => message.clone(),
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                "oops something went wrong".to_string()
            }
        }
    }

    /// Returns the HTTP status an embedding transport should use when the
    /// error is rendered directly rather than redirected.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidClient { .. } | Self::InvalidToken { .. } => 401,
            Self::NotImplemented { .. } => 501,
            _ if self.is_server_error() => 500,
            _ => 400,
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        Self::internal(err.to_string())
    }
}

/// Categories of provider errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Client or grant authentication failures.
    Authentication,
    /// Permission and scope failures.
    Authorization,
    /// Token validation failures.
    Token,
    /// End-User interaction is required.
    Interaction,
    /// Request validation errors.
    Validation,
    /// Storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Token => write!(f, "token"),
            Self::Interaction => write!(f, "interaction"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
