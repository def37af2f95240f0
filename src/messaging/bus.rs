use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;

use super::EventKind;

type EventCallback = Arc<dyn Fn(Value) + Send + Sync + 'static>;

struct Registration {
    id: u64,
    handler: EventCallback,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<Registration>>,
}

/// Multi-subscriber event fan-out.
///
/// Handlers for an event kind are retained in registration order and each
/// invoked once per inbound message. Registration works in any connection
/// state; events that arrive while nothing is registered are dropped,
/// never buffered.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event`. The registration stays active
    /// until the returned guard is unsubscribed or dropped.
    pub fn subscribe<F>(&self, event: impl Into<EventKind>, handler: F) -> Subscription
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let event = event.into();
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .handlers
            .entry(event.clone())
            .or_default()
            .push(Registration {
                id,
                handler: Arc::new(handler),
            });

        Subscription {
            bus: Arc::downgrade(&self.inner),
            event,
            id: AtomicU64::new(id),
        }
    }

    /// Delivers `payload` to every handler registered for `event`, in
    /// registration order.
    ///
    /// Delivery iterates a snapshot taken under the lock, so handlers may
    /// subscribe or unsubscribe mid-delivery without skipping or
    /// double-invoking anyone. A panicking handler is contained and logged;
    /// the remaining handlers still run.
    pub(crate) fn emit(&self, event: &EventKind, payload: Value) {
        let snapshot: Vec<EventCallback> = {
            let inner = self.inner.lock().unwrap();
            match inner.handlers.get(event) {
                Some(registrations) => registrations
                    .iter()
                    .map(|r| Arc::clone(&r.handler))
                    .collect(),
                None => return,
            }
        };

        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(payload.clone()))).is_err() {
                tracing::error!(event = %event, "event handler panicked, continuing delivery");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn handler_count(&self, event: &EventKind) -> usize {
        self.inner
            .lock()
            .unwrap()
            .handlers
            .get(event)
            .map_or(0, Vec::len)
    }
}

fn remove_registration(inner: &Mutex<BusInner>, event: &EventKind, id: u64) {
    let mut inner = inner.lock().unwrap();
    if let Some(registrations) = inner.handlers.get_mut(event) {
        registrations.retain(|r| r.id != id);
        if registrations.is_empty() {
            inner.handlers.remove(event);
        }
    }
}

/// Guard for one bus registration.
///
/// Removes exactly this registration on [`unsubscribe`](Self::unsubscribe)
/// or drop; repeated calls are no-ops. Dropping the guard never tears
/// down the shared connection.
pub struct Subscription {
    bus: Weak<Mutex<BusInner>>,
    event: EventKind,
    id: AtomicU64,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        let id = self.id.swap(0, Ordering::AcqRel);
        if id == 0 {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            remove_registration(&bus, &self.event, id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
