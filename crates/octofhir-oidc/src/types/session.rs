//! Per-user-agent session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::token::generate_token;

/// Pending RP-initiated logout stored between the confirmation prompt and
/// its submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutState {
    /// Anti-forgery secret the confirmation must echo.
    pub secret: String,
    /// Client that initiated the logout, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Where the user agent goes once logout completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_logout_redirect_uri: Option<String>,
    /// Opaque value echoed to the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Authentication state shared by every request from one user agent.
///
/// A client has an entry in `authorizations` exactly when it completed an
/// authorization under this session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier carried in the session cookie.
    pub id: String,

    /// Bound account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,

    /// Time of the last authentication (unix seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,

    /// ACR of the last authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acr: Option<String>,

    /// client_id to `sid`.
    #[serde(default)]
    pub authorizations: BTreeMap<String, String>,

    /// The session cookie must not outlive the user agent.
    #[serde(default)]
    pub transient: bool,

    /// Pending logout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logout: Option<LogoutState>,
}

impl Session {
    /// Creates an empty session with a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(generate_token())
    }

    /// Creates an empty session with the given identifier.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            account_id: None,
            auth_time: None,
            acr: None,
            authorizations: BTreeMap::new(),
            transient: false,
            logout: None,
        }
    }

    /// The bound account, if any.
    #[must_use]
    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    /// The `sid` bound for a client.
    #[must_use]
    pub fn sid_for(&self, client_id: &str) -> Option<&str> {
        self.authorizations.get(client_id).map(String::as_str)
    }

    /// Binds a `sid` for a client.
    pub fn bind_sid(&mut self, client_id: impl Into<String>, sid: impl Into<String>) {
        self.authorizations.insert(client_id.into(), sid.into());
    }

    /// Drops the authorization of a single client.
    pub fn unbind_client(&mut self, client_id: &str) -> Option<String> {
        self.authorizations.remove(client_id)
    }

    /// Binds an account. Switching to a different account discards every
    /// per-client authorization.
    pub fn bind_account(&mut self, account_id: impl Into<String>) {
        let account_id = account_id.into();
        if self.account_id.as_deref() != Some(account_id.as_str()) {
            self.authorizations.clear();
        }
        self.account_id = Some(account_id);
    }

    /// Whether the last authentication is older than `max_age` seconds.
    #[must_use]
    pub fn past(&self, max_age: Option<u64>) -> bool {
        let (Some(max_age), Some(auth_time)) = (max_age, self.auth_time) else {
            return false;
        };
        let age = OffsetDateTime::now_utc()
            .unix_timestamp()
            .saturating_sub(auth_time);
        i64::try_from(max_age).is_ok_and(|max_age| age > max_age)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
