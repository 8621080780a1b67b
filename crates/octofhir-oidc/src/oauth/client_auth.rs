//! Client authentication for the token, introspection and revocation
//! endpoints.
//!
//! # Authentication Methods
//!
//! - `client_secret_basic` - HTTP Basic Auth with client_id:client_secret
//! - `client_secret_post` - client_id and client_secret in request body
//! - `none` - public clients, client_id only
//!
//! The method presented must be the one the client registered.

use tracing::debug;

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::params::Params;
use crate::storage::ClientRegistry;
use crate::types::{Client, TokenEndpointAuthMethod};

/// Result of successful client authentication.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    /// The authenticated client.
    pub client: Client,

    /// The authentication method used.
    pub auth_method: TokenEndpointAuthMethod,
}

/// Authenticates the client of a back-channel request.
///
/// # Arguments
///
/// * `params` - Request parameters (`client_id`, `client_secret`)
/// * `authorization` - Value of the HTTP `Authorization` header, if any
/// * `clients` - Registry used to resolve the client
///
/// # Errors
///
/// Returns `InvalidClient` if no credentials were presented, the client is
/// unknown, the presented method is not the registered one, or the secret
/// does not match.
pub async fn authenticate_client(
    params: &Params,
    authorization: Option<&str>,
    clients: &dyn ClientRegistry,
) -> AuthResult<AuthenticatedClient> {
    let (client_id, secret, method) = match authorization.and_then(parse_basic_auth) {
        Some((client_id, secret)) => {
            if params.get("client_id").is_some_and(|id| id != client_id) {
                return Err(AuthError::invalid_request(
                    "mismatch in body and authorization client ids",
                ));
            }
            (client_id, Some(secret), TokenEndpointAuthMethod::ClientSecretBasic)
        }
        None if authorization.is_some() => {
            return Err(AuthError::invalid_client("invalid authorization header value format"));
        }
        None => {
            let client_id = params.get("client_id").ok_or_else(|| {
                AuthError::invalid_client("no client authentication mechanism provided")
            })?;
            match params.get("client_secret") {
                Some(secret) => (
                    client_id.to_string(),
                    Some(secret.to_string()),
                    TokenEndpointAuthMethod::ClientSecretPost,
                ),
                None => (client_id.to_string(), None, TokenEndpointAuthMethod::None),
            }
        }
    };

    let client = clients
        .find(&client_id)
        .await?
        .ok_or_else(|| AuthError::invalid_client("invalid client_id"))?;

    if client.token_endpoint_auth_method != method {
        debug!(
            client_id = %client.client_id,
            registered = client.token_endpoint_auth_method.as_str(),
            presented = method.as_str(),
            "client authentication method mismatch"
        );
        return Err(AuthError::invalid_client(
            "the registered client token_endpoint_auth_method does not match the provided auth mechanism",
        ));
    }

    if let Some(secret) = secret
        && !client.secret_matches(&secret)
    {
        return Err(AuthError::invalid_client("invalid secret provided"));
    }

    Ok(AuthenticatedClient {
        client,
        auth_method: method,
    })
}

/// Parses an HTTP Basic Authorization header.
///
/// Returns `(client_id, client_secret)` or `None` if the header is not a
/// well-formed Basic credential.
#[must_use]
pub fn parse_basic_auth(header_value: &str) -> Option<(String, String)> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let encoded = header_value.trim().strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    // The secret may itself contain colons.
    let (client_id, client_secret) = credentials.split_once(':')?;

    Some((client_id.to_string(), client_secret.to_string()))
}
