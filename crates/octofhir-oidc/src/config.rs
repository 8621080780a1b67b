//! Provider configuration.
//!
//! Configuration is grouped into sections for lifetimes, feature toggles,
//! cookie naming and signing. Everything has a default so a provider can be
//! constructed with nothing more than an issuer.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Root provider configuration.
///
/// # Example (TOML)
///
/// ```toml
/// issuer = "https://op.example.com"
/// scopes = ["openid", "offline_access", "profile", "email"]
///
/// [ttl]
/// access_token = "1h"
/// authorization_code = "10m"
///
/// [features]
/// backchannel_logout = true
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Issuer identifier, used as the `iss` claim and as the base of the
    /// provider's own URLs.
    pub issuer: String,

    /// Artifact and record lifetimes.
    pub ttl: TtlConfig,

    /// Optional protocol features.
    pub features: FeaturesConfig,

    /// Cookie names and lifetimes used by the embedding transport.
    pub cookies: CookieConfig,

    /// Supported scope values.
    pub scopes: Vec<String>,

    /// Supported `prompt` values. `none` and `login` are always honoured.
    pub prompts: Vec<String>,

    /// Supported `response_type` values, each a space-separated combination.
    pub response_types: Vec<String>,

    /// Supported token endpoint grant types.
    pub grant_types: Vec<String>,

    /// Supported ACR values.
    pub acr_values: Vec<String>,

    /// Scope to claim names mapping used to build the claims mask.
    pub claims: BTreeMap<String, Vec<String>>,

    /// Supported subject identifier types (`public`, `pairwise`).
    pub subject_types: Vec<String>,

    /// Salt mixed into pairwise subject identifiers.
    pub pairwise_salt: String,

    /// Secret used to seal suspension records.
    pub integrity_secret: String,

    /// Rotate refresh tokens on every use.
    pub rotate_refresh_token: bool,

    /// Where the user agent lands after logout when the client did not
    /// supply a registered `post_logout_redirect_uri`. Defaults to the issuer.
    pub post_logout_redirect_uri: Option<String>,

    /// Token signing configuration.
    pub signing: SigningConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:3000".to_string(),
            ttl: TtlConfig::default(),
            features: FeaturesConfig::default(),
            cookies: CookieConfig::default(),
            scopes: ["openid", "offline_access", "profile", "email"]
                .map(String::from)
                .to_vec(),
            prompts: ["consent", "login", "none"].map(String::from).to_vec(),
            response_types: [
                "code id_token token",
                "code id_token",
                "code token",
                "code",
                "id_token token",
                "id_token",
                "none",
            ]
            .map(String::from)
            .to_vec(),
            grant_types: ["authorization_code", "refresh_token", "client_credentials"]
                .map(String::from)
                .to_vec(),
            acr_values: vec!["0".to_string()],
            claims: default_claims(),
            subject_types: vec!["public".to_string(), "pairwise".to_string()],
            pairwise_salt: random_secret(),
            integrity_secret: random_secret(),
            rotate_refresh_token: true,
            post_logout_redirect_uri: None,
            signing: SigningConfig::default(),
        }
    }
}

fn default_claims() -> BTreeMap<String, Vec<String>> {
    let mut claims = BTreeMap::new();
    claims.insert("openid".to_string(), vec!["sub".to_string()]);
    claims.insert(
        "profile".to_string(),
        [
            "name",
            "family_name",
            "given_name",
            "middle_name",
            "nickname",
            "preferred_username",
            "profile",
            "picture",
            "website",
            "gender",
            "birthdate",
            "zoneinfo",
            "locale",
            "updated_at",
        ]
        .map(String::from)
        .to_vec(),
    );
    claims.insert(
        "email".to_string(),
        vec!["email".to_string(), "email_verified".to_string()],
    );
    claims
}

fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Lifetimes of issued artifacts and externalized records.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TtlConfig {
    /// Authorization code lifetime.
    #[serde(with = "humantime_serde")]
    pub authorization_code: Duration,

    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token: Duration,

    /// Client credentials token lifetime.
    #[serde(with = "humantime_serde")]
    pub client_credentials: Duration,

    /// ID token lifetime.
    #[serde(with = "humantime_serde")]
    pub id_token: Duration,

    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token: Duration,

    /// Session lifetime for remembered logins.
    #[serde(with = "humantime_serde")]
    pub session: Duration,

    /// Lifetime of suspension request and result records.
    #[serde(with = "humantime_serde")]
    pub interaction: Duration,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            authorization_code: Duration::from_secs(600),      // 10 minutes
            access_token: Duration::from_secs(3600),           // 1 hour
            client_credentials: Duration::from_secs(600),      // 10 minutes
            id_token: Duration::from_secs(3600),               // 1 hour
            refresh_token: Duration::from_secs(14 * 24 * 3600), // 14 days
            session: Duration::from_secs(14 * 24 * 3600),      // 14 days
            interaction: Duration::from_secs(3600),            // 1 hour
        }
    }
}

/// Optional protocol features.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Bind a `sid` into codes and ID tokens and report back-channel logout
    /// targets on session end.
    pub backchannel_logout: bool,

    /// Add `session_state` to authorization responses.
    pub session_management: bool,

    /// Accept the `claims` request parameter.
    pub claims_parameter: bool,

    /// Enable the introspection endpoint.
    pub introspection: bool,

    /// Enable the revocation endpoint.
    pub revocation: bool,

    /// Enable RP-initiated logout.
    pub end_session: bool,

    /// Publish the discovery document.
    pub discovery: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            backchannel_logout: false,
            session_management: false,
            claims_parameter: false,
            introspection: true,
            revocation: true,
            end_session: true,
            discovery: true,
        }
    }
}

/// Cookie naming used by the embedding transport.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Session cookie name.
    pub session: String,

    /// Name prefix for suspension request records.
    pub interaction: String,

    /// Name prefix for suspension result records.
    pub result: String,

    /// Max age of the persistent session cookie. Transient sessions use a
    /// request-scoped cookie instead.
    #[serde(with = "humantime_serde")]
    pub long_lived: Duration,

    /// Max age of interaction cookies.
    #[serde(with = "humantime_serde")]
    pub short_lived: Duration,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            session: "_session".to_string(),
            interaction: "_grant".to_string(),
            result: "_grant_result".to_string(),
            long_lived: Duration::from_secs(14 * 24 * 3600),
            short_lived: Duration::from_secs(3600),
        }
    }
}

/// Token signing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Signing algorithm.
    /// Supported: "RS256", "RS384", "ES384"
    pub algorithm: String,

    /// Optional PEM encoded private key. A key is generated when absent.
    pub private_key_pem: Option<String>,

    /// Key identifier published in the JWKS.
    pub kid: Option<String>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: "RS256".to_string(),
            private_key_pem: None,
            kid: None,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration sources could not be read or merged.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

const KNOWN_GRANT_TYPES: &[&str] = &["authorization_code", "refresh_token", "client_credentials"];
const KNOWN_RESPONSE_TYPES: &[&str] = &["code", "token", "id_token", "none"];

impl ProviderConfig {
    /// Creates a default configuration for the given issuer.
    #[must_use]
    pub fn with_issuer(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            ..Self::default()
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The issuer is not an absolute URL
    /// - The signing algorithm is not supported
    /// - `openid` is missing from the supported scopes
    /// - A grant type or response type component is unknown
    /// - A subject type other than `public` or `pairwise` is listed
    ///
    /// Returns `ConfigError::Missing` if a secret is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::Missing("issuer".to_string()));
        }
        if url::Url::parse(&self.issuer).is_err() {
            return Err(ConfigError::InvalidValue(format!(
                "issuer must be an absolute URL: '{}'",
                self.issuer
            )));
        }

        match self.signing.algorithm.as_str() {
            "RS256" | "RS384" | "ES384" => {}
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid signing algorithm: '{other}'. Must be RS256, RS384, or ES384"
                )));
            }
        }

        if !self.scopes.iter().any(|s| s == "openid") {
            return Err(ConfigError::InvalidValue(
                "scopes must include openid".to_string(),
            ));
        }

        for grant in &self.grant_types {
            if !KNOWN_GRANT_TYPES.contains(&grant.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid grant type: '{grant}'"
                )));
            }
        }

        for response_type in &self.response_types {
            let parts: Vec<&str> = response_type.split(' ').collect();
            if parts.iter().any(|p| !KNOWN_RESPONSE_TYPES.contains(p))
                || (parts.contains(&"none") && parts.len() > 1)
            {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid response type: '{response_type}'"
                )));
            }
        }

        for subject_type in &self.subject_types {
            if subject_type != "public" && subject_type != "pairwise" {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid subject type: '{subject_type}'"
                )));
            }
        }

        if self.integrity_secret.is_empty() {
            return Err(ConfigError::Missing("integrity_secret".to_string()));
        }
        if self.pairwise_salt.is_empty() {
            return Err(ConfigError::Missing("pairwise_salt".to_string()));
        }

        Ok(())
    }

    /// Returns `true` if `scope` is supported.
    #[must_use]
    pub fn supports_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Returns `true` if the response type combination is supported,
    /// regardless of component order.
    #[must_use]
    pub fn supports_response_type(&self, response_type: &str) -> bool {
        let wanted = sorted_components(response_type);
        self.response_types
            .iter()
            .any(|rt| sorted_components(rt) == wanted)
    }

    /// Returns `true` if the grant type is supported.
    #[must_use]
    pub fn supports_grant_type(&self, grant_type: &str) -> bool {
        self.grant_types.iter().any(|g| g == grant_type)
    }

    /// Claim names released for the given scope value.
    #[must_use]
    pub fn claims_for_scope(&self, scope: &str) -> &[String] {
        self.claims.get(scope).map_or(&[], Vec::as_slice)
    }
}

pub(crate) fn sorted_components(value: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = value.split(' ').filter(|p| !p.is_empty()).collect();
    parts.sort_unstable();
    parts
}

pub mod loader {
    //! Loads [`ProviderConfig`](super::ProviderConfig) from a TOML file and
    //! `OCTOFHIR_OIDC__*` environment variables.

    use super::{ConfigError, ProviderConfig};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Loads and validates the provider configuration.
    ///
    /// A missing file is not an error; environment overrides still apply,
    /// e.g. `OCTOFHIR_OIDC__TTL__ACCESS_TOKEN=30m`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Load` if the sources cannot be merged or
    /// deserialized, or the validation error otherwise.
    pub fn load_config(path: Option<&str>) -> Result<ProviderConfig, ConfigError> {
        let mut builder = Config::builder();
        let path = PathBuf::from(path.unwrap_or("octofhir-oidc.toml"));
        if path.exists() {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix("OCTOFHIR_OIDC")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("scopes")
                .with_list_parse_key("prompts")
                .with_list_parse_key("grant_types")
                .with_list_parse_key("acr_values"),
        );
        let merged: ProviderConfig = builder
            .build()
            .map_err(|e| ConfigError::Load(format!("config build error: {e}")))?
            .try_deserialize()
            .map_err(|e| ConfigError::Load(format!("config deserialize error: {e}")))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = ProviderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.signing.algorithm, "RS256");
        assert!(config.supports_scope("openid"));
    }

    #[test]
    fn test_default_secrets_are_random() {
        let a = ProviderConfig::default();
        let b = ProviderConfig::default();
        assert_ne!(a.integrity_secret, b.integrity_secret);
        assert_ne!(a.pairwise_salt, b.pairwise_salt);
    }

    #[test]
    fn test_relative_issuer_fails_validation() {
        let config = ProviderConfig::with_issuer("/not/absolute");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("issuer"));
    }

    #[test]
    fn test_invalid_algorithm_fails_validation() {
        let mut config = ProviderConfig::default();
        config.signing.algorithm = "HS256".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
        assert!(err.to_string().contains("signing algorithm"));
    }

    #[test]
    fn test_missing_openid_scope_fails_validation() {
        let mut config = ProviderConfig::default();
        config.scopes = vec!["profile".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_response_type_fails_validation() {
        let mut config = ProviderConfig::default();
        config.response_types = vec!["code none".to_string()];
        assert!(config.validate().is_err());

        config.response_types = vec!["code device".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_response_type_order_insensitive() {
        let config = ProviderConfig::default();
        assert!(config.supports_response_type("token id_token code"));
        assert!(config.supports_response_type("id_token code"));
        assert!(!config.supports_response_type("token"));
    }

    #[test]
    fn test_claims_for_scope() {
        let config = ProviderConfig::default();
        assert!(config.claims_for_scope("email").contains(&"email".to_string()));
        assert!(config.claims_for_scope("unknown").is_empty());
    }

    #[test]
    fn test_humantime_deserialization() {
        let config: ProviderConfig = serde_json::from_value(serde_json::json!({
            "issuer": "https://op.example.com",
            "ttl": { "access_token": "30m" }
        }))
        .unwrap();
        assert_eq!(config.ttl.access_token, Duration::from_secs(1800));
        assert_eq!(config.ttl.authorization_code, Duration::from_secs(600));
    }

    #[test]
    fn test_loader_without_file_uses_defaults() {
        let config = loader::load_config(Some("/nonexistent/octofhir-oidc.toml")).unwrap();
        assert!(config.supports_grant_type("authorization_code"));
    }
}
