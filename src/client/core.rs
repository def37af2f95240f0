use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::time::timeout;
use url::Url;

use super::builder::{RealtimeClientBuilder, RealtimeClientOptions};
use super::connection::{ConnectPermit, ConnectionManager, ConnectionState};
use super::state::ClientState;
use crate::classifier::{ErrorReport, ErrorSink};
use crate::messaging::{
    EventBus, EventKind, MessageRouter, StateBroadcaster, StateSubscription, Subscription,
};
use crate::types::constants::REALTIME_CONTEXT;
use crate::types::error::{RealtimeError, Result};
use crate::types::message::EventMessage;
use crate::websocket::{TransportFactory, TransportSink, TransportStream};

/// The process-wide realtime client.
///
/// One `RealtimeClient` backs every consumer in the process; clones are
/// cheap handles onto the same connection, subscriber lists, and state.
/// The client maintains a single transport connection, reconnects it with
/// bounded exponential backoff after failures, and fans inbound events out
/// to subscribers. Subscriptions are independent of the connection: a
/// handler registered while disconnected starts receiving events as soon
/// as a connection forms, and survives every reconnect untouched.
///
/// # Example
///
/// ```no_run
/// use pulselink::{RealtimeClient, RealtimeClientOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = RealtimeClient::new(
///         "wss://realtime.example.com/socket",
///         RealtimeClientOptions::default(),
///     )?;
///
///     let _subscription = client.subscribe("notification", |payload| {
///         println!("notification: {payload}");
///     });
///
///     client.connect("bearer-token").await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RealtimeClient {
    pub(crate) endpoint: String,
    pub(crate) options: RealtimeClientOptions,

    // Connection manager
    pub(crate) connection: Arc<ConnectionManager>,

    // Fan-out components
    pub(crate) bus: EventBus,
    pub(crate) broadcaster: StateBroadcaster,
    pub(crate) router: MessageRouter,

    // Error collaborator
    pub(crate) errors: Arc<dyn ErrorSink>,

    // Consolidated mutable state
    pub(crate) state: Arc<Mutex<ClientState>>,

    pub(crate) factory: Arc<dyn TransportFactory>,
}

impl RealtimeClient {
    /// Creates a client without connecting. Call
    /// [`connect()`](Self::connect) to establish the transport.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::UrlParse`] or [`RealtimeError::Connection`]
    /// if the endpoint is not a valid `ws://`/`wss://` URL.
    pub fn new(endpoint: impl Into<String>, options: RealtimeClientOptions) -> Result<Self> {
        RealtimeClientBuilder::new(endpoint, options).map(RealtimeClientBuilder::build)
    }

    /// Builder variant of [`new`](Self::new) for injecting a transport
    /// factory or error sink.
    pub fn builder(
        endpoint: impl Into<String>,
        options: RealtimeClientOptions,
    ) -> Result<RealtimeClientBuilder> {
        RealtimeClientBuilder::new(endpoint, options)
    }

    /// Establishes the transport connection using `token`.
    ///
    /// Returns immediately as a no-op when already connected, already
    /// connecting, or another `connect` is in flight — any number of
    /// consumers may race this call and exactly one handshake runs.
    ///
    /// On handshake failure the error is returned to the caller and a
    /// reconnect is scheduled with bounded exponential backoff; the
    /// client keeps retrying until [`disconnect()`](Self::disconnect) or
    /// success. The token is retained for those retries and cleared on
    /// explicit disconnect.
    pub async fn connect(&self, token: &str) -> Result<()> {
        if !self.connection.begin_connect() {
            return Ok(());
        }
        let mut permit = ConnectPermit::new(Arc::clone(&self.connection));

        {
            let mut state = self.state.lock().unwrap();
            state.manual_disconnect = false;
            state.auth_token = Some(token.to_string());
            state.task_manager.abort_all();
            state.pending_heartbeat = None;
        }

        tracing::info!(endpoint = %self.endpoint, "connecting");
        match self.handshake(token).await {
            Ok((sink, stream)) => {
                // disconnect() may have landed while the handshake was in
                // flight; cancellation wins over the fresh connection.
                if self.state.lock().unwrap().manual_disconnect {
                    permit.release();
                    tracing::info!("connection cancelled by disconnect");
                    return Ok(());
                }

                self.connection.install_sink(sink).await;
                self.state.lock().unwrap().backoff.reset();
                permit.release();
                self.connection.mark_connected();

                // Spawned only after the Connected transition commits, so
                // a transport that dies immediately is handled as an
                // unexpected drop of a live connection.
                self.spawn_read_task(stream);
                self.spawn_heartbeat_task();

                tracing::info!("connected");
                Ok(())
            }
            Err(e) => {
                permit.release();
                if self.state.lock().unwrap().manual_disconnect {
                    return Err(e);
                }

                let message = e.to_string();
                tracing::error!(error = %message, "handshake failed");
                self.errors
                    .report(ErrorReport::new(message.clone(), None, REALTIME_CONTEXT));
                self.connection.mark_disconnected(Some(message));
                self.schedule_reconnect();
                Err(e)
            }
        }
    }

    /// Tears the connection down and cancels any scheduled reconnect.
    ///
    /// Idempotent: disconnecting while already disconnected changes
    /// nothing and announces nothing. Cancellation always wins — a retry
    /// whose timer is already counting down never fires afterwards.
    pub async fn disconnect(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.manual_disconnect = true;
            state.auth_token = None;
            state.cancel_retry();
            state.task_manager.abort_all();
            state.pending_heartbeat = None;
            state.backoff.reset();
        }

        self.connection.close_sink().await;

        let snapshot = self.connection.snapshot();
        if snapshot.is_connected || snapshot.is_connecting || snapshot.error.is_some() {
            self.connection.mark_disconnected(None);
            tracing::info!("disconnected");
        }
    }

    /// Current connection state, by copy.
    pub fn get_state(&self) -> ConnectionState {
        self.connection.snapshot()
    }

    /// Checks whether the client is currently connected.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Registers `handler` for `event`.
    ///
    /// Valid in any connection state; there is no replay of events that
    /// arrived before registration or while disconnected. The
    /// registration lives until the returned guard is unsubscribed or
    /// dropped.
    pub fn subscribe<F>(&self, event: impl Into<EventKind>, handler: F) -> Subscription
    where
        F: Fn(serde_json::Value) + Send + Sync + 'static,
    {
        self.bus.subscribe(event, handler)
    }

    /// Registers `handler` for future state transitions.
    ///
    /// The current state is not replayed; read
    /// [`get_state()`](Self::get_state) first, immediately before
    /// subscribing.
    pub fn on_state_change<F>(&self, handler: F) -> StateSubscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.broadcaster.on_state_change(handler)
    }

    /// Sends an event to the server over the open connection.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::NotConnected`] while disconnected.
    pub async fn send(&self, event: impl Into<EventKind>, payload: serde_json::Value) -> Result<()> {
        if !self.connection.is_connected() {
            return Err(RealtimeError::NotConnected);
        }
        self.connection
            .send(EventMessage::new(event.into(), payload))
            .await
    }

    async fn handshake(&self, token: &str) -> Result<(TransportSink, TransportStream)> {
        let url = self.build_endpoint_url(token)?;
        match timeout(self.options.handshake_timeout(), self.factory.connect(&url)).await {
            Ok(result) => result,
            Err(_) => Err(RealtimeError::Timeout),
        }
    }

    /// Build the endpoint URL with the bearer token as a query parameter
    fn build_endpoint_url(&self, token: &str) -> Result<String> {
        let mut url = Url::parse(&self.endpoint)?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url.to_string())
    }

    fn spawn_read_task(&self, mut stream: TransportStream) {
        let client = self.clone();
        self.state.lock().unwrap().task_manager.spawn(async move {
            tracing::debug!("read task started");
            loop {
                match stream.next().await {
                    Some(Ok(message)) => client.router.route(message),
                    Some(Err(e)) => {
                        client.handle_transport_drop(e.to_string()).await;
                        break;
                    }
                    None => {
                        client
                            .handle_transport_drop("connection closed by server".to_string())
                            .await;
                        break;
                    }
                }
            }
            tracing::debug!("read task finished");
        });
    }

    fn spawn_heartbeat_task(&self) {
        let Some(interval) = self.options.heartbeat_interval() else {
            return;
        };

        let client = self.clone();
        self.state.lock().unwrap().task_manager.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; swallow it so the first
            // probe waits a full interval.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !client.connection.is_connected() {
                    break;
                }

                let missed = client.state.lock().unwrap().pending_heartbeat.is_some();
                if missed {
                    client
                        .handle_transport_drop("heartbeat timed out".to_string())
                        .await;
                    break;
                }

                let beat_ref = client.state.lock().unwrap().next_heartbeat_ref();
                let probe = EventMessage::new(
                    EventKind::Heartbeat,
                    serde_json::json!({ "ref": beat_ref }),
                );
                match client.connection.send(probe).await {
                    Ok(()) => {
                        client.state.lock().unwrap().pending_heartbeat = Some(beat_ref);
                        tracing::debug!(heartbeat_ref = beat_ref, "heartbeat sent");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to send heartbeat");
                        break;
                    }
                }
            }
            tracing::debug!("heartbeat task finished");
        });
    }

    /// Unexpected transport closure: handled like a connect failure —
    /// unless an explicit disconnect is already tearing things down.
    async fn handle_transport_drop(&self, reason: String) {
        if self.state.lock().unwrap().manual_disconnect {
            return;
        }

        tracing::warn!(error = %reason, "transport dropped");
        self.connection.clear_sink().await;
        self.errors
            .report(ErrorReport::new(reason.clone(), None, REALTIME_CONTEXT));
        self.connection.mark_disconnected(Some(reason));
        self.schedule_reconnect();
    }

    /// Schedules the single pending reconnect attempt.
    ///
    /// The attempt is one abortable task: sleep the backoff delay, then
    /// `connect` again. `disconnect()` cancels it by aborting the handle,
    /// which also cancels a timer already counting down.
    fn schedule_reconnect(&self) {
        let mut state = self.state.lock().unwrap();
        if state.manual_disconnect {
            return;
        }
        let Some(token) = state.auth_token.clone() else {
            return;
        };

        let delay = state.backoff.next_delay();
        state.cancel_retry();

        let client = self.clone();
        tracing::info!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        state.retry_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = client.state.lock().unwrap();
                if state.manual_disconnect {
                    return;
                }
                // This attempt is now in flight; free the slot for the
                // next failure to fill.
                state.retry_task = None;
            }
            if let Err(e) = client.connect(&token).await {
                tracing::warn!(error = %e, "reconnect attempt failed");
            }
        }));
    }
}
