//! Suspension and resumption of authorization requests.
//!
//! A suspended request leaves two records behind, both keyed by the same
//! `uid`: the request record written here when the request is suspended,
//! and the result record written once the interaction UI is done. Both are
//! sealed as HS256 JWTs with an `exp` claim, so the transport only moves
//! opaque strings and tampered or stale records fail to open.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::decision::InteractionOutcome;
use crate::AuthResult;
use crate::config::ProviderConfig;
use crate::discovery::AUTHORIZATION_PATH;
use crate::error::AuthError;
use crate::oauth::params::Params;
use crate::storage::SuspensionTransport;
use crate::types::Session;

// =============================================================================
// Records
// =============================================================================

/// Authentication performed during the interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResult {
    /// Account that signed in.
    pub account: String,
    /// Keep the session beyond the user agent's lifetime. Anything but
    /// `true` makes the session transient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remember: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acr: Option<String>,
    /// Authentication time (unix seconds), now when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

/// Consent given during the interaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentResult {
    /// Scope the End-User agreed to, replacing the requested scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// What the interaction UI resolved.
///
/// Custom prompts are resolved by a top-level member named after them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<LoginResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent: Option<ConsentResult>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InteractionResult {
    /// Whether nothing was resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.login.is_none() && self.consent.is_none() && self.extra.is_empty()
    }

    /// Whether `prompt` was resolved. `none` never is.
    #[must_use]
    pub fn resolves(&self, prompt: &str) -> bool {
        match prompt {
            "none" => false,
            "login" => self.login.is_some(),
            "consent" => self.consent.is_some(),
            other => self.extra.contains_key(other),
        }
    }
}

/// The request record of a suspended authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspensionRecord {
    /// Correlation id shared by both records.
    pub uid: String,
    /// The original authorization parameters.
    pub params: Params,
    /// Why the request was suspended.
    pub outcome: InteractionOutcome,
    /// Where the user agent resumes the request.
    pub return_to: String,
}

#[derive(Serialize, Deserialize)]
struct Sealed<T> {
    rec: T,
    exp: i64,
}

// =============================================================================
// Protocol
// =============================================================================

/// Writes, reads and consumes suspension records.
pub struct ResumeProtocol {
    transport: Arc<dyn SuspensionTransport>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    request_prefix: String,
    result_prefix: String,
    ttl: Duration,
    resume_base: String,
}

impl ResumeProtocol {
    /// Creates the protocol over `transport`, sealing with the configured
    /// integrity secret.
    #[must_use]
    pub fn new(config: &ProviderConfig, transport: Arc<dyn SuspensionTransport>) -> Self {
        let secret = config.integrity_secret.as_bytes();
        Self {
            transport,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            request_prefix: config.cookies.interaction.clone(),
            result_prefix: config.cookies.result.clone(),
            ttl: config.ttl.interaction,
            resume_base: format!(
                "{}{AUTHORIZATION_PATH}",
                config.issuer.trim_end_matches('/')
            ),
        }
    }

    fn request_key(&self, uid: &str) -> String {
        format!("{}.{uid}", self.request_prefix)
    }

    fn result_key(&self, uid: &str) -> String {
        format!("{}.{uid}", self.result_prefix)
    }

    fn seal<T: Serialize>(&self, record: T) -> AuthResult<String> {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let sealed = Sealed {
            rec: record,
            exp: OffsetDateTime::now_utc().unix_timestamp().saturating_add(ttl),
        };
        encode(&Header::new(Algorithm::HS256), &sealed, &self.encoding_key)
            .map_err(|e| AuthError::internal(format!("could not seal interaction record: {e}")))
    }

    fn open<T: DeserializeOwned>(&self, sealed: &str) -> Option<T> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.leeway = 0;
        match decode::<Sealed<T>>(sealed, &self.decoding_key, &validation) {
            Ok(data) => Some(data.claims.rec),
            Err(err) => {
                debug!(error = %err, "interaction record rejected");
                None
            }
        }
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> AuthResult<Option<T>> {
        Ok(self
            .transport
            .read(key)
            .await?
            .and_then(|sealed| self.open(&sealed)))
    }

    /// Externalizes a suspended request under a fresh `uid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be sealed or written.
    pub async fn suspend(
        &self,
        params: &Params,
        outcome: InteractionOutcome,
    ) -> AuthResult<SuspensionRecord> {
        let uid = Uuid::new_v4().to_string();
        let record = SuspensionRecord {
            return_to: format!("{}/{uid}", self.resume_base),
            uid,
            params: params.clone(),
            outcome,
        };
        let sealed = self.seal(&record)?;
        self.transport
            .write(&self.request_key(&record.uid), &sealed, self.ttl)
            .await?;
        Ok(record)
    }

    /// Reads the request record without consuming it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the record is missing, tampered with or
    /// expired.
    pub async fn details(&self, uid: &str) -> AuthResult<SuspensionRecord> {
        self.read(&self.request_key(uid))
            .await?
            .ok_or_else(expired)
    }

    /// Stores the interaction result and returns the URL that resumes the
    /// request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the request record is gone, or a
    /// transport error.
    pub async fn complete(&self, uid: &str, result: &InteractionResult) -> AuthResult<String> {
        let record = self.details(uid).await?;
        let sealed = self.seal(result)?;
        self.transport
            .write(&self.result_key(uid), &sealed, self.ttl)
            .await?;
        Ok(record.return_to)
    }

    /// Consumes both records of `uid`.
    ///
    /// An unreadable request record is terminal. An unreadable or missing
    /// result record reads as an empty result.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` ("authorization request has expired") if the
    /// request record cannot be opened, or a transport error.
    pub async fn resume(&self, uid: &str) -> AuthResult<(SuspensionRecord, InteractionResult)> {
        let request_key = self.request_key(uid);
        let result_key = self.result_key(uid);

        let record: Option<SuspensionRecord> = self.read(&request_key).await?;
        let result: Option<InteractionResult> = self.read(&result_key).await?;

        self.transport.remove(&request_key).await?;
        self.transport.remove(&result_key).await?;

        let record = record.filter(|r| r.uid == uid).ok_or_else(expired)?;
        Ok((record, result.unwrap_or_default()))
    }
}

impl fmt::Debug for ResumeProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumeProtocol")
            .field("request_prefix", &self.request_prefix)
            .field("result_prefix", &self.result_prefix)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

fn expired() -> AuthError {
    AuthError::invalid_request("authorization request has expired")
}

/// Applies an interaction result to the session and the resumed
/// parameters.
///
/// Signing in as a different account drops every client authorization of
/// the session. A non-empty result authorizes the requesting client by
/// binding a fresh `sid` when it has none.
pub fn merge(session: &mut Session, params: &mut Params, result: &InteractionResult) {
    if let Some(login) = &result.login {
        session.bind_account(login.account.clone());
        session.transient = login.remember != Some(true);
        session.acr = login.acr.clone();
        session.auth_time = Some(
            login
                .ts
                .unwrap_or_else(|| OffsetDateTime::now_utc().unix_timestamp()),
        );
    }

    if let Some(scope) = result.consent.as_ref().and_then(|c| c.scope.clone()) {
        params.set("scope", scope);
    }

    if !result.is_empty()
        && let Some(client_id) = params.get("client_id")
        && session.sid_for(client_id).is_none()
    {
        session.bind_sid(client_id.to_string(), Uuid::new_v4().to_string());
    }
}
