use serde::{Deserialize, Serialize};

use crate::messaging::EventKind;

/// The wire envelope: an event name plus an opaque JSON payload.
///
/// Payloads pass through to subscribers unmodified; this crate never
/// inspects them beyond routing on `event`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventMessage {
    pub event: EventKind,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl EventMessage {
    pub fn new(event: EventKind, payload: serde_json::Value) -> Self {
        Self { event, payload }
    }
}
