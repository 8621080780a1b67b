//! ID token assembly, hash binding and `id_token_hint` validation.
//!
//! An [`IdToken`] is built from already-masked account claims, gets its
//! `at_hash`/`c_hash` set once the sibling artifacts exist, and is signed
//! last.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use super::jwt::{JwtError, JwtService, SigningAlgorithm};
use super::subject::subject_for;
use crate::types::Client;

/// Left-most half of the algorithm's digest of `value`, base64url encoded.
///
/// This is the `at_hash`/`c_hash` construction from OpenID Connect Core
/// 3.3.2.11.
#[must_use]
pub fn hash_binding(algorithm: SigningAlgorithm, value: &str) -> String {
    let digest = algorithm.digest(value.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}

/// An unsigned ID token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdToken {
    claims: Map<String, Value>,
}

impl IdToken {
    /// Starts from the account claims released for this client. The `sub`
    /// member must hold the account identifier.
    #[must_use]
    pub fn new(claims: Map<String, Value>) -> Self {
        Self { claims }
    }

    /// Sets a claim, removing it when `value` is `None`.
    pub fn set(&mut self, name: &str, value: Option<impl Into<Value>>) {
        match value {
            Some(value) => {
                self.claims.insert(name.to_string(), value.into());
            }
            None => {
                self.claims.remove(name);
            }
        }
    }

    /// Reads a claim.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// Binds the access token issued alongside this ID token.
    pub fn bind_access_token(&mut self, algorithm: SigningAlgorithm, access_token: &str) {
        self.set("at_hash", Some(hash_binding(algorithm, access_token)));
    }

    /// Binds the authorization code issued alongside this ID token.
    pub fn bind_code(&mut self, algorithm: SigningAlgorithm, code: &str) {
        self.set("c_hash", Some(hash_binding(algorithm, code)));
    }

    /// Signs the token for `client`.
    ///
    /// `sub` is replaced by the subject `client` is entitled to see and the
    /// registered claims `iss`, `aud`, `iat` and `exp` are added.
    ///
    /// # Errors
    ///
    /// Returns an error if `sub` is missing or signing fails.
    pub fn sign(
        &self,
        jwt: &JwtService,
        client: &Client,
        pairwise_salt: &str,
        ttl: Duration,
    ) -> Result<String, JwtError> {
        let account_id = self
            .claims
            .get("sub")
            .and_then(Value::as_str)
            .ok_or_else(|| JwtError::invalid_claims("id token has no subject"))?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut payload = self.claims.clone();
        payload.insert(
            "sub".to_string(),
            Value::String(subject_for(account_id, client, pairwise_salt)),
        );
        payload.insert("iss".to_string(), Value::String(jwt.issuer().to_string()));
        payload.insert("aud".to_string(), Value::String(client.client_id.clone()));
        payload.insert("iat".to_string(), Value::from(now));
        payload.insert(
            "exp".to_string(),
            Value::from(now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))),
        );

        jwt.encode(&payload)
    }
}

/// Validates an `id_token_hint` presented by `client`.
///
/// The signature and issuer must be ours and `client` must be among the
/// audiences. An expired hint is still accepted.
///
/// # Errors
///
/// Returns an error if the hint fails any of those checks.
pub fn validate_hint(
    jwt: &JwtService,
    hint: &str,
    client: &Client,
) -> Result<Map<String, Value>, JwtError> {
    jwt.decode_allow_expired::<Map<String, Value>>(hint, Some(client.client_id.as_str()))
        .map(|data| data.claims)
}

/// Decodes an `id_token_hint` whose client is not yet known, returning the
/// first audience. The signature is verified; the audience is not.
///
/// # Errors
///
/// Returns an error if the hint is not ours or carries no audience.
pub fn hint_audience(jwt: &JwtService, hint: &str) -> Result<String, JwtError> {
    let claims = jwt
        .decode_allow_expired::<Map<String, Value>>(hint, None)?
        .claims;
    match claims.get("aud") {
        Some(Value::String(aud)) => Ok(aud.clone()),
        Some(Value::Array(auds)) => auds
            .first()
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| JwtError::invalid_claims("empty aud")),
        _ => Err(JwtError::invalid_claims("missing aud")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::jwt::SigningKeyPair;
    use crate::types::SubjectType;
    use serde_json::json;

    fn service(algorithm: SigningAlgorithm) -> JwtService {
        JwtService::new(
            SigningKeyPair::generate(algorithm).unwrap(),
            "https://op.example.com",
        )
    }

    fn client() -> Client {
        let mut client = Client::new("client", "secret");
        client.redirect_uris = vec!["https://rp.example.com/cb".to_string()];
        client
    }

    fn id_token() -> IdToken {
        let claims = json!({"sub": "alice", "email": "alice@example.com"});
        IdToken::new(claims.as_object().unwrap().clone())
    }

    #[test]
    fn test_hash_binding_known_value() {
        // OpenID Connect Core A.3 example access token and at_hash.
        let at_hash = hash_binding(SigningAlgorithm::RS256, "jHkWEdUXMU1BwAsC4vtUsZwnNvTIxEl0z9K3vx5KF0Y");
        assert_eq!(at_hash, "77QmUPtjPfzWtF2AnpK9RQ");
    }

    #[test]
    fn test_hash_binding_length_follows_algorithm() {
        assert_eq!(hash_binding(SigningAlgorithm::RS256, "code").len(), 22);
        assert_eq!(hash_binding(SigningAlgorithm::ES384, "code").len(), 32);
    }

    #[test]
    fn test_sign_sets_registered_claims() {
        let jwt = service(SigningAlgorithm::RS256);
        let mut token = id_token();
        token.set("nonce", Some("n-0S6_WzA2Mj"));
        token.bind_code(jwt.algorithm(), "the-code");

        let compact = token.sign(&jwt, &client(), "salt", Duration::from_secs(60)).unwrap();
        let claims = validate_hint(&jwt, &compact, &client()).unwrap();

        assert_eq!(claims["sub"], "alice");
        assert_eq!(claims["aud"], "client");
        assert_eq!(claims["iss"], "https://op.example.com");
        assert_eq!(claims["nonce"], "n-0S6_WzA2Mj");
        assert_eq!(claims["c_hash"], hash_binding(SigningAlgorithm::RS256, "the-code"));
        assert!(claims.get("at_hash").is_none());
    }

    #[test]
    fn test_sign_uses_pairwise_subject() {
        let jwt = service(SigningAlgorithm::ES384);
        let mut pairwise = client();
        pairwise.subject_type = SubjectType::Pairwise;

        let compact = id_token()
            .sign(&jwt, &pairwise, "salt", Duration::from_secs(60))
            .unwrap();
        let claims = validate_hint(&jwt, &compact, &pairwise).unwrap();
        assert_eq!(claims["sub"], subject_for("alice", &pairwise, "salt"));
    }

    #[test]
    fn test_sign_without_subject_fails() {
        let jwt = service(SigningAlgorithm::RS256);
        let err = IdToken::default()
            .sign(&jwt, &client(), "salt", Duration::from_secs(60))
            .unwrap_err();
        assert!(matches!(err, JwtError::InvalidClaims { .. }));
    }

    #[test]
    fn test_hint_requires_audience_and_tolerates_expiry() {
        let jwt = service(SigningAlgorithm::RS256);
        let compact = id_token()
            .sign(&jwt, &client(), "salt", Duration::ZERO)
            .unwrap();

        assert!(validate_hint(&jwt, &compact, &client()).is_ok());
        assert_eq!(hint_audience(&jwt, &compact).unwrap(), "client");

        let other = Client::new("other", "secret");
        assert!(validate_hint(&jwt, &compact, &other).is_err());
        assert!(validate_hint(&jwt, "not-a-jwt", &client()).is_err());
    }

    #[test]
    fn test_set_none_removes_claim() {
        let mut token = id_token();
        token.set("email", None::<String>);
        assert!(token.get("email").is_none());
    }
}
