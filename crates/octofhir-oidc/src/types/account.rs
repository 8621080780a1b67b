//! End-User accounts as seen by the provider.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::claims::ClaimsMask;

/// An account resolved through [`AccountStore`](crate::storage::AccountStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Stable account identifier, the `public` subject.
    pub account_id: String,

    /// Every claim the account can release.
    #[serde(default)]
    pub claims: Map<String, Value>,
}

impl Account {
    /// Creates an account without claims.
    #[must_use]
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            claims: Map::new(),
        }
    }

    /// Adds a claim.
    #[must_use]
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    /// Claims released under `mask`. `sub` is always the account identifier
    /// here; pairwise subjects are applied when the token is signed.
    #[must_use]
    pub fn claims(&self, mask: &ClaimsMask) -> Map<String, Value> {
        let mut claims = mask.filter(&self.claims);
        claims.insert("sub".to_string(), Value::String(self.account_id.clone()));
        claims
    }
}
