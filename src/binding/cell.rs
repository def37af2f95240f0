use std::sync::{Arc, RwLock};

use serde_json::Value;

type Callback = Arc<dyn Fn(Value) + Send + Sync + 'static>;

/// One-slot mutable reference holding a consumer's latest callback.
///
/// Bus registrations forward through the cell, so replacing the callback
/// never re-subscribes and delivery is never lost to a swap happening
/// mid-flight.
#[derive(Clone, Default)]
pub struct HandlerCell {
    slot: Arc<RwLock<Option<Callback>>>,
}

impl HandlerCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new callback, replacing the previous one.
    pub fn set<F>(&self, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        *self.slot.write().unwrap() = Some(Arc::new(handler));
    }

    /// Removes the current callback; deliveries become no-ops.
    pub fn clear(&self) {
        *self.slot.write().unwrap() = None;
    }

    /// Invokes the current callback, if any. The slot lock is released
    /// before the call, so a callback may replace itself.
    pub fn invoke(&self, payload: Value) {
        let handler = self.slot.read().unwrap().clone();
        if let Some(handler) = handler {
            handler(payload);
        }
    }
}
