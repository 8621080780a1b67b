//! Suspension transport trait.
//!
//! Moves the sealed request and result records of a suspended
//! authorization. Cookies, a cache or a database table all qualify; the
//! records are already signed and time-limited so the transport only needs
//! to carry opaque strings.

use std::time::Duration;

use async_trait::async_trait;

use crate::AuthResult;

/// Carrier for externalized suspension records.
#[async_trait]
pub trait SuspensionTransport: Send + Sync {
    /// Writes a record under `key` for at most `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    async fn write(&self, key: &str, record: &str, ttl: Duration) -> AuthResult<()>;

    /// Reads the record stored under `key`.
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` if nothing is stored or the record expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    async fn read(&self, key: &str) -> AuthResult<Option<String>>;

    /// Removes the record under `key`. Removing an absent record succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    async fn remove(&self, key: &str) -> AuthResult<()>;
}
