//! Whitelisted request parameters.
//!
//! Every endpoint accepts a known set of parameter names. Unknown names are
//! dropped, known names must appear at most once, and empty values are
//! treated as if the parameter was not sent at all.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::config::ProviderConfig;
use crate::error::AuthError;

/// Parameters accepted by the authorization endpoint.
pub const AUTHORIZATION_PARAMS: &[&str] = &[
    "acr_values",
    "claims",
    "claims_locales",
    "client_id",
    "code_challenge",
    "code_challenge_method",
    "display",
    "id_token_hint",
    "login_hint",
    "max_age",
    "nonce",
    "prompt",
    "redirect_uri",
    "response_mode",
    "response_type",
    "scope",
    "state",
    "ui_locales",
];

/// Parameters accepted by the token endpoint regardless of grant type.
pub const TOKEN_PARAMS: &[&str] = &["client_id", "client_secret", "grant_type"];

/// Parameters accepted by the introspection and revocation endpoints.
pub const TOKEN_MANAGEMENT_PARAMS: &[&str] =
    &["client_id", "client_secret", "token", "token_type_hint"];

/// Parameters accepted when a logout is initiated.
pub const END_SESSION_PARAMS: &[&str] = &["id_token_hint", "post_logout_redirect_uri", "state"];

/// Parameters accepted when a logout is confirmed.
pub const END_SESSION_CONFIRM_PARAMS: &[&str] = &["logout", "xsrf"];

/// Authorization endpoint parameters enabled by `config`. `claims` is only
/// accepted with the claims parameter feature.
#[must_use]
pub fn authorization_params(config: &ProviderConfig) -> BTreeSet<String> {
    AUTHORIZATION_PARAMS
        .iter()
        .filter(|name| config.features.claims_parameter || **name != "claims")
        .map(|name| (*name).to_string())
        .collect()
}

/// Turns a constant name list into an accepted set.
#[must_use]
pub fn accepted(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

/// Validated request parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    /// Parses form or query pairs, keeping only `accepted` names.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if an accepted parameter is repeated.
    pub fn from_pairs<I, K, V>(pairs: I, accepted: &BTreeSet<String>) -> AuthResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut values = BTreeMap::new();
        let mut duplicates = BTreeSet::new();

        for (name, value) in pairs {
            let name = name.as_ref();
            if !accepted.contains(name) {
                continue;
            }
            if values.insert(name.to_string(), value.into()).is_some() {
                duplicates.insert(name.to_string());
            }
        }

        if !duplicates.is_empty() {
            let names: Vec<String> = duplicates.into_iter().collect();
            return Err(AuthError::invalid_request(format!(
                "parameters must not be provided twice. ({})",
                names.join(",")
            )));
        }

        values.retain(|_, value: &mut String| !value.is_empty());
        Ok(Self(values))
    }

    /// Returns a parameter value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Whether a parameter is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Sets a parameter, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Removes a parameter.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    /// Fails unless every name in `names` is present.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` listing the missing names.
    pub fn require(&self, names: &[&str]) -> AuthResult<()> {
        let missing: Vec<&str> = names
            .iter()
            .copied()
            .filter(|name| !self.contains(name))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AuthError::invalid_request(format!(
                "missing required parameter(s) ({})",
                missing.join(",")
            )))
        }
    }

    /// Iterates over the parameters in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
