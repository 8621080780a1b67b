//! Client registry trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Client;

/// Read access to registered clients.
///
/// Registration and updates happen outside the provider and write through
/// the same backend.
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// Finds a client by its `client_id`.
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` if no such client is registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find(&self, client_id: &str) -> AuthResult<Option<Client>>;
}
