//! # octofhir-oidc
//!
//! OpenID Connect / OAuth 2.0 provider engine for OctoFHIR.
//!
//! This crate provides:
//! - Authorization request validation and the interaction decision engine
//! - Suspension and resumption of requests around an external login/consent UI
//! - Issuance of codes, access tokens and ID tokens for every response type
//! - Token endpoint grants (`authorization_code`, `refresh_token`,
//!   `client_credentials`) with a registry for custom grants
//! - Token introspection and revocation across token kinds
//! - RP-initiated logout with back-channel logout targets
//! - Discovery metadata and the JWKS document
//!
//! ## Overview
//!
//! The engine is transport-neutral. [`Provider`] takes decoded request
//! parameters and a session identifier and returns what the transport must
//! send back. Persistence is delegated to the traits in [`storage`]; the
//! `octofhir-oidc-memory` crate implements them in memory.
//!
//! ## Modules
//!
//! - [`config`] - Provider configuration
//! - [`error`] - Protocol errors
//! - [`events`] - Provider events for embedding applications
//! - [`interaction`] - Decision engine and resume protocol
//! - [`oauth`] - Request parameters, validation and response delivery
//! - [`grant`] - Token endpoint grant handlers
//! - [`token`] - Signing, ID tokens and token lookup
//! - [`session`] - Session load/save around requests
//! - [`end_session`] - RP-initiated logout
//! - [`discovery`] - Provider metadata
//! - [`storage`] - Storage contracts
//! - [`types`] - Clients, tokens, sessions and accounts

pub mod config;
pub mod context;
pub mod discovery;
pub mod end_session;
pub mod error;
pub mod events;
pub mod grant;
pub mod interaction;
pub mod oauth;
pub mod provider;
pub mod session;
pub mod storage;
pub mod token;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, ProviderConfig};
pub use context::ProviderContext;
pub use discovery::DiscoveryDocument;
pub use error::{AuthError, ErrorCategory};
pub use events::{BackchannelTarget, EventBroadcaster, ProviderEvent};
pub use grant::{GrantContext, GrantHandler, GrantRegistry};
pub use interaction::{
    ConsentResult, InteractionOutcome, InteractionResult, LoginResult, SuspensionRecord,
};
pub use oauth::{AuthorizationResponse, Params, ResponseModeHandler, TokenResponse};
pub use provider::{Authorized, InteractionUrl, LoggedOut, LogoutStarted, Provider, ProviderBuilder};
pub use session::SessionCookie;
pub use storage::{
    AccountStore, ClientRegistry, SessionStore, SuspensionTransport, TokenStore, TokenStores,
};
pub use token::{IntrospectionResponse, Jwks, JwtError, SigningAlgorithm, SigningKeyPair};
pub use types::{Account, Client, Session, Token, TokenKind};

/// Type alias for provider results.
pub type AuthResult<T> = Result<T, AuthError>;
