//! Suspension record transport.

use std::time::Duration;

use async_trait::async_trait;
use octofhir_oidc::{AuthResult, SuspensionTransport};

use crate::expiring::ExpiringMap;

/// Holds suspended requests and interaction results server side.
///
/// Stands in for the request-scoped cookies a browser-facing deployment
/// would use; records expire with the ttl they were written with.
pub struct InMemoryTransport {
    records: ExpiringMap<String>,
}

impl InMemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: ExpiringMap::new(),
        }
    }

    /// Number of records currently held, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cleanup_expired(&self) -> usize {
        self.records.cleanup_expired()
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SuspensionTransport for InMemoryTransport {
    async fn write(&self, key: &str, record: &str, ttl: Duration) -> AuthResult<()> {
        self.records.insert(key, record.to_string(), Some(ttl));
        Ok(())
    }

    async fn read(&self, key: &str) -> AuthResult<Option<String>> {
        Ok(self.records.get(key))
    }

    async fn remove(&self, key: &str) -> AuthResult<()> {
        self.records.remove(key);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransport")
            .field("len", &self.records.len())
            .finish()
    }
}
