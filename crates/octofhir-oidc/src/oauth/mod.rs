//! OAuth 2.0 / OpenID Connect protocol building blocks.
//!
//! - [`params`] - whitelisted parameter parsing
//! - [`authorize`] - authorization request validation
//! - [`response_types`] - issuance of codes, access tokens and ID tokens
//! - [`respond`] - response modes and `session_state`
//! - [`client_auth`] - client authentication at back-channel endpoints
//! - [`pkce`] - PKCE verification
//! - [`token`] - token endpoint response

pub mod authorize;
pub mod client_auth;
pub mod params;
pub mod pkce;
pub mod respond;
pub mod response_types;
pub mod token;

pub use authorize::{AuthorizationRequest, RedirectTarget};
pub use client_auth::{AuthenticatedClient, authenticate_client, parse_basic_auth};
pub use params::Params;
pub use pkce::PkceChallengeMethod;
pub use respond::{AuthorizationResponse, ResponseMode, ResponseModeHandler, ResponseModes};
pub use response_types::{IssuanceContext, process_response_types};
pub use token::TokenResponse;
