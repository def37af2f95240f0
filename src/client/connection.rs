use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use futures::SinkExt;

use crate::messaging::StateBroadcaster;
use crate::types::error::{RealtimeError, Result};
use crate::types::message::EventMessage;
use crate::websocket::TransportSink;

/// Snapshot of the shared connection state.
///
/// Exactly one live instance exists per client; everything handed out is
/// a copy, so callers can never mutate manager-owned state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectionState {
    pub is_connected: bool,
    pub is_connecting: bool,
    pub error: Option<String>,
    pub last_connected: Option<SystemTime>,
}

/// Owns the single transport connection and the state machine around it.
///
/// All mutation funnels through [`transition`](Self::transition)-based
/// methods, which announce the committed snapshot to state subscribers.
/// State handlers run synchronously inside the announcement; they must
/// stay quick and spawn for anything that reconnects or disconnects.
pub struct ConnectionManager {
    state: Mutex<ConnectionState>,
    /// True exactly while one `connect()` awaits its handshake.
    connect_in_flight: AtomicBool,
    /// Serializes mutation + announcement so transitions reach
    /// subscribers in the order they occur, never reordered or coalesced.
    transition_guard: Mutex<()>,
    sink: tokio::sync::Mutex<Option<TransportSink>>,
    broadcaster: StateBroadcaster,
}

impl ConnectionManager {
    pub(crate) fn new(broadcaster: StateBroadcaster) -> Self {
        Self {
            state: Mutex::new(ConnectionState::default()),
            connect_in_flight: AtomicBool::new(false),
            transition_guard: Mutex::new(()),
            sink: tokio::sync::Mutex::new(None),
            broadcaster,
        }
    }

    /// Current state, by copy.
    pub fn snapshot(&self) -> ConnectionState {
        self.state.lock().unwrap().clone()
    }

    /// Checks if currently connected
    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().is_connected
    }

    /// Claims the right to run a handshake and transitions to Connecting.
    ///
    /// Returns false when already connected, already connecting, or
    /// another `connect()` holds the in-flight flag — the caller must
    /// treat that as a no-op. The previous `error` is deliberately kept:
    /// consumers watching a retry see `is_connecting` together with the
    /// failure that caused it.
    pub(crate) fn begin_connect(&self) -> bool {
        {
            let state = self.state.lock().unwrap();
            if state.is_connected || state.is_connecting {
                return false;
            }
        }

        if self
            .connect_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        self.transition(|state| state.is_connecting = true);
        true
    }

    /// Releases the in-flight flag without touching state.
    pub(crate) fn release_connect(&self) {
        self.connect_in_flight.store(false, Ordering::Release);
    }

    /// Commits a successful handshake: connected, error cleared,
    /// `last_connected` stamped.
    pub(crate) fn mark_connected(&self) {
        self.transition(|state| {
            state.is_connected = true;
            state.is_connecting = false;
            state.error = None;
            state.last_connected = Some(SystemTime::now());
        });
    }

    /// Transitions to disconnected. `error` is `None` for an explicit
    /// disconnect and `Some` for a failure that feeds the retry loop.
    pub(crate) fn mark_disconnected(&self, error: Option<String>) {
        self.transition(|state| {
            state.is_connected = false;
            state.is_connecting = false;
            state.error = error;
        });
    }

    fn transition<F: FnOnce(&mut ConnectionState)>(&self, apply: F) {
        let _ordering = self.transition_guard.lock().unwrap();
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            apply(&mut state);
            state.clone()
        };
        self.broadcaster.emit(snapshot);
    }

    /// Installs the write half of a fresh connection.
    pub(crate) async fn install_sink(&self, sink: TransportSink) {
        *self.sink.lock().await = Some(sink);
    }

    /// Drops the write half without a close handshake (transport already
    /// gone).
    pub(crate) async fn clear_sink(&self) {
        *self.sink.lock().await = None;
    }

    /// Closes the transport write half if one is open.
    pub(crate) async fn close_sink(&self) {
        let mut guard = self.sink.lock().await;
        if let Some(sink) = guard.as_mut()
            && let Err(e) = sink.close().await
        {
            tracing::debug!(error = %e, "error closing transport");
        }
        *guard = None;
    }

    /// Sends a message over the open transport.
    pub(crate) async fn send(&self, message: EventMessage) -> Result<()> {
        let mut guard = self.sink.lock().await;
        match guard.as_mut() {
            Some(sink) => sink.send(message).await,
            None => Err(RealtimeError::NotConnected),
        }
    }
}

/// Releases the connect-in-flight flag when dropped, unless already
/// released. Covers the case where a connect task is aborted mid-handshake
/// and would otherwise leak the flag and block every future `connect()`.
pub(crate) struct ConnectPermit {
    manager: std::sync::Arc<ConnectionManager>,
    released: bool,
}

impl ConnectPermit {
    pub(crate) fn new(manager: std::sync::Arc<ConnectionManager>) -> Self {
        Self {
            manager,
            released: false,
        }
    }

    /// Releases the flag. Idempotent.
    pub(crate) fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.manager.release_connect();
        }
    }
}

impl Drop for ConnectPermit {
    fn drop(&mut self) {
        self.release();
    }
}
