//! Signing keys and compact JWS handling.
//!
//! ID tokens are signed with one of RS256, RS384 or ES384. The same service
//! verifies `id_token_hint` values presented back to the provider.
//!
//! ## Example
//!
//! ```ignore
//! use octofhir_oidc::token::jwt::{JwtService, SigningAlgorithm, SigningKeyPair};
//!
//! let key_pair = SigningKeyPair::generate_rsa(SigningAlgorithm::RS256)?;
//! let jwt = JwtService::new(key_pair, "https://op.example.com");
//! let compact = jwt.encode(&claims)?;
//! ```

use std::fmt;
use std::str::FromStr;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode,
};
use p384::SecretKey as EcSecretKey;
use p384::ecdsa::SigningKey as EcSigningKey;
use p384::pkcs8::{DecodePrivateKey as EcDecodePrivateKey, EncodePrivateKey as EcEncodePrivateKey};
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384};
use time::OffsetDateTime;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a token.
    #[error("Failed to decode token: {message}")]
    DecodingError {
        /// Description of the decoding error.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },

    /// Failed to generate a cryptographic key.
    #[error("Key generation error: {message}")]
    KeyGenerationError {
        /// Description of the key generation error.
        message: String,
    },

    /// Invalid key format or data.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `DecodingError`.
    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClaims` error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    /// Creates a new `KeyGenerationError`.
    #[must_use]
    pub fn key_generation_error(message: impl Into<String>) -> Self {
        Self::KeyGenerationError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Returns `true` if the token itself was rejected, as opposed to a key
    /// or encoding problem on our side.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Expired
                | Self::InvalidSignature
                | Self::InvalidClaims { .. }
                | Self::DecodingError { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => Self::invalid_key(err.to_string()),
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported signing algorithms for ID tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// RSA with SHA-256.
    RS256,
    /// RSA with SHA-384.
    RS384,
    /// ECDSA with P-384 and SHA-384.
    ES384,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Returns the algorithm name as used in JWK/JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::ES384 => "ES384",
        }
    }

    /// Returns `true` if this is an RSA-based algorithm.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384)
    }

    /// Digest of `value` with the hash function paired with this algorithm.
    #[must_use]
    pub fn digest(&self, value: &[u8]) -> Vec<u8> {
        match self {
            Self::RS256 => Sha256::digest(value).to_vec(),
            Self::RS384 | Self::ES384 => Sha384::digest(value).to_vec(),
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = JwtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "ES384" => Ok(Self::ES384),
            other => Err(JwtError::invalid_key(format!(
                "unsupported signing algorithm {other}"
            ))),
        }
    }
}

// ============================================================================
// JWKS Types
// ============================================================================

/// JSON Web Key Set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwks {
    /// The keys in this set.
    pub keys: Vec<Jwk>,
}

/// JSON Web Key (public part only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC").
    pub kty: String,

    /// Key ID.
    pub kid: String,

    /// Key use ("sig" for signing).
    #[serde(rename = "use")]
    pub use_: String,

    /// Algorithm.
    pub alg: String,

    /// RSA modulus (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// EC curve name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

// ============================================================================
// Signing Key Pair
// ============================================================================

/// A signing key pair.
pub struct SigningKeyPair {
    /// Key ID.
    pub kid: String,

    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    public_key_data: PublicKeyData,

    /// When the key was created or loaded.
    pub created_at: OffsetDateTime,
}

enum PublicKeyData {
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Ec { x: Vec<u8>, y: Vec<u8> },
}

impl SigningKeyPair {
    /// Generates a new 2048-bit RSA key pair.
    ///
    /// # Errors
    /// Returns an error if key generation fails or algorithm is not RSA-based.
    pub fn generate_rsa(algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        if !algorithm.is_rsa() {
            return Err(JwtError::invalid_key(format!(
                "Algorithm {algorithm} is not RSA-based"
            )));
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        Self::from_rsa_key(uuid::Uuid::new_v4().to_string(), algorithm, &private_key, &private_pem)
    }

    /// Generates a new EC key pair using the P-384 curve.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate_ec() -> Result<Self, JwtError> {
        let secret_key = EcSecretKey::random(&mut OsRng);
        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        Self::from_ec_key(uuid::Uuid::new_v4().to_string(), &secret_key, &private_pem)
    }

    /// Generates a key pair for `algorithm`.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate(algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        if algorithm.is_rsa() {
            Self::generate_rsa(algorithm)
        } else {
            Self::generate_ec()
        }
    }

    /// Loads a key pair from a PEM encoded private key. The public half is
    /// derived from it. RSA keys may be PKCS#1 or PKCS#8, EC keys PKCS#8 or
    /// SEC1.
    ///
    /// # Errors
    /// Returns an error if the PEM data is invalid for `algorithm`.
    pub fn from_private_pem(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        private_pem: &str,
    ) -> Result<Self, JwtError> {
        let kid = kid.into();
        if algorithm.is_rsa() {
            let private_key = RsaPrivateKey::from_pkcs8_pem(private_pem)
                .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_pem))
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            Self::from_rsa_key(kid, algorithm, &private_key, private_pem)
        } else {
            let secret_key = EcSecretKey::from_pkcs8_pem(private_pem)
                .or_else(|_| EcSecretKey::from_sec1_pem(private_pem))
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            let pkcs8 = secret_key
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            Self::from_ec_key(kid, &secret_key, &pkcs8)
        }
    }

    fn from_rsa_key(
        kid: String,
        algorithm: SigningAlgorithm,
        private_key: &RsaPrivateKey,
        private_pem: &str,
    ) -> Result<Self, JwtError> {
        let public_key = private_key.to_public_key();
        let n = public_key.n().to_bytes_be();
        let e = public_key.e().to_bytes_be();

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_components(
            &URL_SAFE_NO_PAD.encode(&n),
            &URL_SAFE_NO_PAD.encode(&e),
        )
        .map_err(|e| JwtError::invalid_key(e.to_string()))?;

        Ok(Self {
            kid,
            algorithm,
            encoding_key,
            decoding_key,
            public_key_data: PublicKeyData::Rsa { n, e },
            created_at: OffsetDateTime::now_utc(),
        })
    }

    fn from_ec_key(
        kid: String,
        secret_key: &EcSecretKey,
        pkcs8_pem: &str,
    ) -> Result<Self, JwtError> {
        let signing_key = EcSigningKey::from(secret_key);
        let point = signing_key.verifying_key().to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| JwtError::invalid_key("Missing x coordinate"))?;
        let y = point
            .y()
            .ok_or_else(|| JwtError::invalid_key("Missing y coordinate"))?;

        let encoding_key = EncodingKey::from_ec_pem(pkcs8_pem.as_bytes())
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let decoding_key = DecodingKey::from_ec_components(
            &URL_SAFE_NO_PAD.encode(x.as_slice()),
            &URL_SAFE_NO_PAD.encode(y.as_slice()),
        )
        .map_err(|e| JwtError::invalid_key(e.to_string()))?;

        Ok(Self {
            kid,
            algorithm: SigningAlgorithm::ES384,
            encoding_key,
            decoding_key,
            public_key_data: PublicKeyData::Ec {
                x: x.to_vec(),
                y: y.to_vec(),
            },
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Exports the public key as a JWK.
    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        let (kty, n, e, crv, x, y) = match &self.public_key_data {
            PublicKeyData::Rsa { n, e } => (
                "RSA",
                Some(URL_SAFE_NO_PAD.encode(n)),
                Some(URL_SAFE_NO_PAD.encode(e)),
                None,
                None,
                None,
            ),
            PublicKeyData::Ec { x, y } => (
                "EC",
                None,
                None,
                Some("P-384".to_string()),
                Some(URL_SAFE_NO_PAD.encode(x)),
                Some(URL_SAFE_NO_PAD.encode(y)),
            ),
        };
        Jwk {
            kty: kty.to_string(),
            kid: self.kid.clone(),
            use_: "sig".to_string(),
            alg: self.algorithm.as_str().to_string(),
            n,
            e,
            crv,
            x,
            y,
        }
    }
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// JWT Service
// ============================================================================

/// Signs and verifies compact JWS values with the provider's key.
pub struct JwtService {
    signing_key: SigningKeyPair,
    issuer: String,
}

impl JwtService {
    /// Creates a new JWT service.
    #[must_use]
    pub fn new(signing_key: SigningKeyPair, issuer: impl Into<String>) -> Self {
        Self {
            signing_key,
            issuer: issuer.into(),
        }
    }

    /// Encodes claims into a JWT string.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn encode<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        let mut header = Header::new(self.signing_key.algorithm.to_jwt_algorithm());
        header.kid = Some(self.signing_key.kid.clone());

        encode(&header, claims, &self.signing_key.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    fn validation(&self, audience: Option<&str>, validate_exp: bool) -> Validation {
        let mut validation = Validation::new(self.signing_key.algorithm.to_jwt_algorithm());
        validation.set_issuer(&[&self.issuer]);
        validation.validate_exp = validate_exp;
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        if !validate_exp {
            validation.required_spec_claims.remove("exp");
        }
        validation
    }

    /// Decodes and validates a JWT issued for `audience`.
    ///
    /// # Errors
    /// Returns an error if decoding or validation fails.
    pub fn decode<T: DeserializeOwned>(
        &self,
        token: &str,
        audience: &str,
    ) -> Result<TokenData<T>, JwtError> {
        decode(token, &self.signing_key.decoding_key, &self.validation(Some(audience), true))
            .map_err(JwtError::from)
    }

    /// Decodes a JWT without validating expiration. Signature, issuer and
    /// audience (when given) are still checked.
    ///
    /// # Errors
    /// Returns an error if decoding fails.
    pub fn decode_allow_expired<T: DeserializeOwned>(
        &self,
        token: &str,
        audience: Option<&str>,
    ) -> Result<TokenData<T>, JwtError> {
        decode(token, &self.signing_key.decoding_key, &self.validation(audience, false))
            .map_err(JwtError::from)
    }

    /// Returns the signing algorithm.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.signing_key.algorithm
    }

    /// Returns the current signing key ID.
    #[must_use]
    pub fn current_kid(&self) -> &str {
        &self.signing_key.kid
    }

    /// Returns the issuer URL.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the JWKS containing the public key.
    #[must_use]
    pub fn jwks(&self) -> Jwks {
        Jwks {
            keys: vec![self.signing_key.to_jwk()],
        }
    }
}

impl fmt::Debug for JwtService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtService")
            .field("issuer", &self.issuer)
            .field("signing_key", &self.signing_key)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    const ISSUER: &str = "https://op.example.com";

    fn claims(exp_offset: i64) -> Value {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        json!({
            "iss": ISSUER,
            "sub": "alice",
            "aud": "client",
            "iat": now,
            "exp": now + exp_offset,
        })
    }

    #[test]
    fn test_generate_keys() {
        let rsa = SigningKeyPair::generate(SigningAlgorithm::RS384).unwrap();
        assert_eq!(rsa.algorithm, SigningAlgorithm::RS384);
        assert_eq!(rsa.to_jwk().kty, "RSA");

        let ec = SigningKeyPair::generate(SigningAlgorithm::ES384).unwrap();
        assert_eq!(ec.algorithm, SigningAlgorithm::ES384);
        assert_eq!(ec.to_jwk().crv.as_deref(), Some("P-384"));
    }

    #[test]
    fn test_generate_rsa_rejects_ec_algorithm() {
        let err = SigningKeyPair::generate_rsa(SigningAlgorithm::ES384).unwrap_err();
        assert!(matches!(err, JwtError::InvalidKey { .. }));
    }

    #[test]
    fn test_encode_decode_checks_audience() {
        let jwt = JwtService::new(
            SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap(),
            ISSUER,
        );
        let token = jwt.encode(&claims(300)).unwrap();

        let data = jwt.decode::<Value>(&token, "client").unwrap();
        assert_eq!(data.claims["sub"], "alice");
        assert_eq!(data.header.kid.as_deref(), Some(jwt.current_kid()));

        let err = jwt.decode::<Value>(&token, "other").unwrap_err();
        assert!(matches!(err, JwtError::InvalidClaims { .. }));
    }

    #[test]
    fn test_decode_allow_expired() {
        let jwt = JwtService::new(SigningKeyPair::generate_ec().unwrap(), ISSUER);
        let token = jwt.encode(&claims(-3600)).unwrap();

        assert!(matches!(
            jwt.decode::<Value>(&token, "client").unwrap_err(),
            JwtError::Expired
        ));
        assert!(jwt.decode_allow_expired::<Value>(&token, Some("client")).is_ok());
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let ours = JwtService::new(
            SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap(),
            ISSUER,
        );
        let theirs = JwtService::new(
            SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap(),
            ISSUER,
        );
        let token = theirs.encode(&claims(300)).unwrap();
        let err = ours.decode::<Value>(&token, "client").unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_from_private_pem_roundtrip() {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let pem = private_key.to_pkcs8_pem(LineEnding::LF).unwrap();

        let key = SigningKeyPair::from_private_pem("kid-1", SigningAlgorithm::RS256, &pem).unwrap();
        let jwt = JwtService::new(key, ISSUER);
        let token = jwt.encode(&claims(300)).unwrap();
        assert!(jwt.decode::<Value>(&token, "client").is_ok());
        assert_eq!(jwt.jwks().keys[0].kid, "kid-1");
    }

    #[test]
    fn test_algorithm_digest_sizes() {
        assert_eq!(SigningAlgorithm::RS256.digest(b"x").len(), 32);
        assert_eq!(SigningAlgorithm::RS384.digest(b"x").len(), 48);
        assert_eq!(SigningAlgorithm::ES384.digest(b"x").len(), 48);
        assert_eq!("ES384".parse::<SigningAlgorithm>().unwrap(), SigningAlgorithm::ES384);
        assert!("HS256".parse::<SigningAlgorithm>().is_err());
    }
}
