//! Session load and save around a single request.
//!
//! A session is loaded once when a request enters the provider and saved
//! once when it leaves, after every mutation. The returned
//! [`SessionCookie`] tells the embedding transport how to set the session
//! cookie: transient sessions get a cookie without `Max-Age` so it dies with
//! the user agent.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::AuthResult;
use crate::config::ProviderConfig;
use crate::storage::SessionStore;
use crate::types::Session;

/// Instructions for the session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    /// Cookie name.
    pub name: String,
    /// Session identifier, empty when the cookie must be removed.
    pub value: String,
    /// `None` for a browser-session cookie, zero to remove the cookie.
    pub max_age: Option<Duration>,
}

impl SessionCookie {
    /// Whether the transport should delete the cookie.
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.max_age == Some(Duration::ZERO)
    }
}

/// Loads and persists sessions.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
    cookie_name: String,
    cookie_max_age: Duration,
}

impl SessionManager {
    /// Creates a manager over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, config: &ProviderConfig) -> Self {
        Self {
            store,
            ttl: config.ttl.session,
            cookie_name: config.cookies.session.clone(),
            cookie_max_age: config.cookies.long_lived,
        }
    }

    /// Loads the session named by the session cookie, or starts a new one.
    ///
    /// An unknown identifier never gets adopted; the new session always has
    /// a fresh identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn load(&self, id: Option<&str>) -> AuthResult<Session> {
        if let Some(id) = id.filter(|id| !id.is_empty())
            && let Some(session) = self.store.find(id).await?
        {
            return Ok(session);
        }
        debug!("starting new session");
        Ok(Session::new())
    }

    /// Persists the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn save(&self, session: &Session) -> AuthResult<SessionCookie> {
        self.store.save(session, self.ttl).await?;
        Ok(SessionCookie {
            name: self.cookie_name.clone(),
            value: session.id.clone(),
            max_age: (!session.transient).then_some(self.cookie_max_age),
        })
    }

    /// Removes the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn destroy(&self, session: &Session) -> AuthResult<SessionCookie> {
        self.store.destroy(&session.id).await?;
        debug!("session destroyed");
        Ok(SessionCookie {
            name: self.cookie_name.clone(),
            value: String::new(),
            max_age: Some(Duration::ZERO),
        })
    }

    /// Looks a session up without creating one.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn find(&self, id: &str) -> AuthResult<Option<Session>> {
        self.store.find(id).await
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("ttl", &self.ttl)
            .field("cookie_name", &self.cookie_name)
            .finish_non_exhaustive()
    }
}
