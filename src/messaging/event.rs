use serde::{Deserialize, Serialize};

use crate::types::constants::event_names;

/// Type-safe event kinds.
///
/// The closed set covers everything the notification server emits today;
/// `Custom` keeps unknown names routable so a newer server does not break
/// older clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// An inbound notification for the current user
    Notification,

    /// Unread-counter update
    UnreadCount,

    /// Application-level error delivered over an established connection
    ChannelError,

    /// Liveness probe and its acknowledgement
    Heartbeat,

    /// Custom user-defined event
    Custom(String),
}

impl EventKind {
    /// Parse a wire name into an EventKind
    pub fn from_str(s: &str) -> Self {
        match s {
            event_names::NOTIFICATION => Self::Notification,
            event_names::UNREAD_COUNT => Self::UnreadCount,
            event_names::CHANNEL_ERROR => Self::ChannelError,
            event_names::HEARTBEAT => Self::Heartbeat,
            _ => Self::Custom(s.to_string()),
        }
    }

    /// Wire name of the event
    pub fn as_str(&self) -> &str {
        match self {
            Self::Notification => event_names::NOTIFICATION,
            Self::UnreadCount => event_names::UNREAD_COUNT,
            Self::ChannelError => event_names::CHANNEL_ERROR,
            Self::Heartbeat => event_names::HEARTBEAT,
            Self::Custom(s) => s,
        }
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        Self::from_str(s)
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        Self::from_str(&s)
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
