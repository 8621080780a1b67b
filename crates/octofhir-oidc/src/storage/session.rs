//! Session storage trait.

use std::time::Duration;

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Session;

/// Storage for per-user-agent sessions.
///
/// Concurrent saves of the same session are last-write-wins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Finds a session by identifier.
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` if the session does not exist or has expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find(&self, id: &str) -> AuthResult<Option<Session>>;

    /// Persists a session for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn save(&self, session: &Session, ttl: Duration) -> AuthResult<()>;

    /// Deletes a session. Deleting an absent session succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn destroy(&self, id: &str) -> AuthResult<()>;
}
