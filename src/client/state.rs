use tokio::task::JoinHandle;

use crate::infrastructure::{Backoff, TaskManager};

/// Consolidated mutable state for RealtimeClient
/// Using a single struct reduces lock contention
pub struct ClientState {
    /// Background read/heartbeat tasks of the current connection
    pub task_manager: TaskManager,

    /// The single pending reconnect attempt, if one is scheduled
    pub retry_task: Option<JoinHandle<()>>,

    /// Reconnection delay cursor
    pub backoff: Backoff,

    /// Token of the session being maintained; retries re-handshake with
    /// it. Cleared on explicit disconnect.
    pub auth_token: Option<String>,

    /// Set by `disconnect()`; gates every reconnect path
    pub manual_disconnect: bool,

    /// Ref of the heartbeat awaiting its ack, if any
    pub pending_heartbeat: Option<u64>,

    /// Current ref counter for heartbeats
    pub heartbeat_counter: u64,
}

impl ClientState {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            task_manager: TaskManager::new(),
            retry_task: None,
            backoff,
            auth_token: None,
            manual_disconnect: false,
            pending_heartbeat: None,
            heartbeat_counter: 0,
        }
    }

    /// Generate next heartbeat reference
    pub fn next_heartbeat_ref(&mut self) -> u64 {
        self.heartbeat_counter += 1;
        self.heartbeat_counter
    }

    /// Aborts the scheduled retry, if any
    pub fn cancel_retry(&mut self) {
        if let Some(task) = self.retry_task.take() {
            task.abort();
        }
    }
}
