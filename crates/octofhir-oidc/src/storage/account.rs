//! Account lookup trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Account;

/// Resolves accounts bound to sessions and tokens.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Finds an account by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn find_by_id(&self, account_id: &str) -> AuthResult<Option<Account>>;
}
