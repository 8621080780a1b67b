//! PKCE (Proof Key for Code Exchange), RFC 7636.
//!
//! Both `S256` and `plain` are accepted. A challenge sent without a method
//! is a `plain` challenge.
//!
//! # Example
//!
//! ```
//! use octofhir_oidc::oauth::pkce::{PkceChallengeMethod, challenge_for, verify};
//!
//! let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
//! let challenge = challenge_for(verifier, PkceChallengeMethod::S256);
//! assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
//! assert!(verify(&challenge, PkceChallengeMethod::S256, verifier));
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::AuthResult;
use crate::error::AuthError;

// =============================================================================
// Challenge Method
// =============================================================================

/// PKCE challenge method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PkceChallengeMethod {
    /// SHA-256 hash of the verifier.
    S256,
    /// The verifier itself.
    #[default]
    #[serde(rename = "plain")]
    Plain,
}

impl PkceChallengeMethod {
    /// Parses a `code_challenge_method` value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for anything other than `S256` or `plain`.
    pub fn parse(method: &str) -> AuthResult<Self> {
        match method {
            "S256" => Ok(Self::S256),
            "plain" => Ok(Self::Plain),
            _ => Err(AuthError::invalid_request(
                "not supported value of code_challenge_method",
            )),
        }
    }

    /// Returns the method as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
            Self::Plain => "plain",
        }
    }
}

impl std::fmt::Display for PkceChallengeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Challenge / Verification
// =============================================================================

/// Computes the challenge a client derives from `verifier`.
///
/// For `S256` this is `BASE64URL(SHA256(ASCII(code_verifier)))`.
#[must_use]
pub fn challenge_for(verifier: &str, method: PkceChallengeMethod) -> String {
    match method {
        PkceChallengeMethod::S256 => URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes())),
        PkceChallengeMethod::Plain => verifier.to_string(),
    }
}

/// Checks `verifier` against a stored challenge.
#[must_use]
pub fn verify(challenge: &str, method: PkceChallengeMethod, verifier: &str) -> bool {
    let expected = challenge_for(verifier, method);
    expected.len() == challenge.len()
        && expected
            .bytes()
            .zip(challenge.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7636 Appendix B.
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn test_s256_rfc_vector() {
        assert_eq!(challenge_for(VERIFIER, PkceChallengeMethod::S256), CHALLENGE);
        assert!(verify(CHALLENGE, PkceChallengeMethod::S256, VERIFIER));
        assert!(!verify(CHALLENGE, PkceChallengeMethod::S256, "wrong"));
    }

    #[test]
    fn test_plain() {
        assert!(verify(VERIFIER, PkceChallengeMethod::Plain, VERIFIER));
        assert!(!verify(CHALLENGE, PkceChallengeMethod::Plain, VERIFIER));
    }

    #[test]
    fn test_parse_method() {
        assert_eq!(PkceChallengeMethod::parse("S256").unwrap(), PkceChallengeMethod::S256);
        assert_eq!(PkceChallengeMethod::parse("plain").unwrap(), PkceChallengeMethod::Plain);
        assert!(PkceChallengeMethod::parse("s256").is_err());
        assert_eq!(PkceChallengeMethod::default(), PkceChallengeMethod::Plain);
    }
}
