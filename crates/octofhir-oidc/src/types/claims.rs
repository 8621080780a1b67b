//! The `claims` request parameter and the mask it produces.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ProviderConfig;

/// Request for an individual claim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimRequest {
    /// Whether the claim is essential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub essential: Option<bool>,

    /// Exact value requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Set of acceptable values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
}

impl ClaimRequest {
    fn is_essential(&self) -> bool {
        self.essential == Some(true)
    }
}

/// Parsed `claims` request parameter.
///
/// Members map a claim name to either `null` (default request) or a
/// [`ClaimRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimsRequest {
    /// Claims requested in the ID token.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub id_token: BTreeMap<String, Option<ClaimRequest>>,

    /// Claims requested from the userinfo endpoint.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub userinfo: BTreeMap<String, Option<ClaimRequest>>,
}

impl ClaimsRequest {
    /// Parses the JSON encoded `claims` parameter.
    ///
    /// # Errors
    ///
    /// Returns the serde error message when the value is not a valid claims
    /// request object.
    pub fn parse(raw: &str) -> Result<Self, String> {
        serde_json::from_str(raw).map_err(|e| e.to_string())
    }

    fn id_token_member(&self, name: &str) -> Option<&ClaimRequest> {
        self.id_token.get(name).and_then(Option::as_ref)
    }

    /// The `sub` value requested for the ID token, if any.
    #[must_use]
    pub fn requested_sub(&self) -> Option<&Value> {
        self.id_token_member("sub").and_then(|c| c.value.as_ref())
    }

    /// ACR values requested as essential through `acr.values`.
    #[must_use]
    pub fn essential_acr_values(&self) -> Option<&[Value]> {
        self.id_token_member("acr")
            .filter(|c| c.is_essential())
            .and_then(|c| c.values.as_deref())
    }

    /// ACR value requested as essential through `acr.value`.
    #[must_use]
    pub fn essential_acr_value(&self) -> Option<&Value> {
        self.id_token_member("acr")
            .filter(|c| c.is_essential())
            .and_then(|c| c.value.as_ref())
    }
}

/// Set of claim names that may be emitted for one artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimsMask {
    names: BTreeSet<String>,
}

impl ClaimsMask {
    /// Builds the mask from granted scopes plus explicitly requested claims.
    #[must_use]
    pub fn new<'a>(
        config: &ProviderConfig,
        scopes: impl IntoIterator<Item = &'a str>,
        requested: &BTreeMap<String, Option<ClaimRequest>>,
    ) -> Self {
        let mut names: BTreeSet<String> = scopes
            .into_iter()
            .flat_map(|scope| config.claims_for_scope(scope).iter().cloned())
            .collect();
        names.extend(requested.keys().cloned());
        names.insert("sub".to_string());
        Self { names }
    }

    /// Whether the claim may be emitted.
    #[must_use]
    pub fn allows(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Keeps only the allowed members of `claims`.
    #[must_use]
    pub fn filter(&self, claims: &serde_json::Map<String, Value>) -> serde_json::Map<String, Value> {
        claims
            .iter()
            .filter(|(name, _)| self.allows(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}
