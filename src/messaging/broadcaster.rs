use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::client::ConnectionState;

type StateCallback = Arc<dyn Fn(ConnectionState) + Send + Sync + 'static>;

#[derive(Default)]
struct BroadcasterInner {
    next_id: u64,
    handlers: Vec<(u64, StateCallback)>,
}

/// Fan-out of connection-state transitions.
///
/// Handlers receive every committed transition, in order, never coalesced.
/// A newly registered handler sees only future transitions; read the
/// current snapshot with `get_state()` first, immediately before
/// subscribing.
#[derive(Clone, Default)]
pub struct StateBroadcaster {
    inner: Arc<Mutex<BroadcasterInner>>,
}

impl StateBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for future state transitions.
    pub fn on_state_change<F>(&self, handler: F) -> StateSubscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.handlers.push((id, Arc::new(handler)));

        StateSubscription {
            broadcaster: Arc::downgrade(&self.inner),
            id: AtomicU64::new(id),
        }
    }

    /// Delivers a committed snapshot to every handler in registration
    /// order. A panicking handler is contained; the rest still run.
    pub(crate) fn emit(&self, snapshot: ConnectionState) {
        let handlers: Vec<StateCallback> = {
            let inner = self.inner.lock().unwrap();
            inner.handlers.iter().map(|(_, h)| Arc::clone(h)).collect()
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(snapshot.clone()))).is_err() {
                tracing::error!("state-change handler panicked, continuing delivery");
            }
        }
    }
}

/// Guard for one state-change registration; same semantics as the event
/// bus [`Subscription`](super::Subscription).
pub struct StateSubscription {
    broadcaster: Weak<Mutex<BroadcasterInner>>,
    id: AtomicU64,
}

impl StateSubscription {
    pub fn unsubscribe(&self) {
        let id = self.id.swap(0, Ordering::AcqRel);
        if id == 0 {
            return;
        }
        if let Some(broadcaster) = self.broadcaster.upgrade() {
            broadcaster
                .lock()
                .unwrap()
                .handlers
                .retain(|(handler_id, _)| *handler_id != id);
        }
    }
}

impl Drop for StateSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
