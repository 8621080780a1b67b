//! Provider notifications.
//!
//! The provider publishes [`ProviderEvent`]s on a broadcast channel so the
//! embedding application can audit or react to protocol activity. Nothing in
//! the provider depends on a listener being present.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::TokenKind;

/// Events beyond this limit are dropped for slow receivers.
const DEFAULT_BUFFER_SIZE: usize = 256;

/// A back-channel logout target reported when a session ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackchannelTarget {
    /// Client that was authorized under the ended session.
    pub client_id: String,
    /// The `sid` bound for that client.
    pub sid: String,
}

/// Protocol activity published by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderEvent {
    /// An authorization request was suspended for End-User interaction.
    InteractionStarted {
        uid: String,
        client_id: String,
        reason: String,
    },
    /// A suspended request was resumed.
    InteractionEnded { uid: String, client_id: String },
    /// The authorization request passed validation and the decision engine.
    AuthorizationAccepted { client_id: String },
    /// An authorization response was produced.
    AuthorizationSuccess {
        client_id: String,
        response_type: String,
    },
    /// An authorization request failed.
    AuthorizationError {
        client_id: Option<String>,
        error: String,
    },
    /// A token endpoint grant completed.
    GrantSuccess {
        client_id: String,
        grant_type: String,
    },
    /// A token endpoint request failed.
    GrantError {
        client_id: Option<String>,
        grant_type: Option<String>,
        error: String,
    },
    /// A token was persisted.
    TokenIssued { kind: TokenKind, client_id: String },
    /// A token was revoked.
    TokenRevoked { kind: TokenKind, client_id: String },
    /// A session ended through RP-initiated logout.
    EndSessionSuccess {
        client_id: Option<String>,
        account_id: Option<String>,
        backchannel: Vec<BackchannelTarget>,
    },
}

/// Broadcaster for provider events.
///
/// Cheap to clone; every clone publishes to the same channel.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<ProviderEvent>,
}

impl EventBroadcaster {
    /// Create a new broadcaster with default buffer size.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    /// Create a new broadcaster with custom buffer size.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, 0 when
    /// nobody is listening.
    pub fn send(&self, event: ProviderEvent) -> usize {
        self.sender.send(event).unwrap_or_default()
    }

    /// Subscribe to events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
