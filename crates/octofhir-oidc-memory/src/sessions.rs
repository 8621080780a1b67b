//! Session storage.

use std::time::Duration;

use async_trait::async_trait;
use octofhir_oidc::{AuthResult, Session, SessionStore};

use crate::expiring::ExpiringMap;

/// Stores sessions for the ttl they are saved with.
pub struct InMemorySessionStore {
    sessions: ExpiringMap<Session>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: ExpiringMap::new(),
        }
    }

    pub fn cleanup_expired(&self) -> usize {
        self.sessions.cleanup_expired()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn find(&self, id: &str) -> AuthResult<Option<Session>> {
        Ok(self.sessions.get(id))
    }

    async fn save(&self, session: &Session, ttl: Duration) -> AuthResult<()> {
        self.sessions
            .insert(session.id.clone(), session.clone(), Some(ttl));
        Ok(())
    }

    async fn destroy(&self, id: &str) -> AuthResult<()> {
        self.sessions.remove(id);
        Ok(())
    }
}

impl std::fmt::Debug for InMemorySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySessionStore")
            .field("len", &self.sessions.len())
            .finish()
    }
}
