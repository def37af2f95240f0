use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::cell::HandlerCell;
use crate::client::{ConnectionState, RealtimeClient};
use crate::messaging::{EventKind, StateSubscription, Subscription};
use crate::types::error::{RealtimeError, Result};

/// Activation options for a [`Binding`].
#[derive(Debug, Clone, Default)]
pub struct BindingOptions {
    /// Bearer token used for the activation-time connect and the explicit
    /// [`connect()`](Binding::connect) action. `None` means this consumer
    /// is unauthenticated and never initiates a connection.
    pub auth_token: Option<String>,
}

/// Ties one consumer's active lifetime to the shared client.
///
/// On activation a binding registers stable bus subscriptions for the
/// events consumers care about, mirrors connection-state transitions into
/// a local snapshot, and — when credentials are available and nothing is
/// connected or in flight — connects the shared client. Deactivating (or
/// dropping) the binding removes its registrations and nothing else: the
/// shared connection stays up for other consumers, and disconnection only
/// ever happens through the explicit [`disconnect()`](Self::disconnect)
/// action.
///
/// Consumer callbacks are held in [`HandlerCell`]s: replacing a callback
/// with `set_on_notification` and friends swaps the cell contents while
/// the underlying registration keeps its identity, so no event is lost to
/// a handler being replaced mid-flight.
///
/// Must be activated from within a tokio runtime.
pub struct Binding {
    client: RealtimeClient,
    auth_token: Option<String>,
    /// Guards this binding's own activation-time connect; the client's
    /// global in-flight flag covers races between bindings.
    connect_guard: Arc<AtomicBool>,
    state: Arc<Mutex<ConnectionState>>,
    last_event: Arc<Mutex<Option<Value>>>,
    on_notification: HandlerCell,
    on_unread_count: HandlerCell,
    on_channel_error: HandlerCell,
    subscriptions: Vec<Subscription>,
    _state_subscription: StateSubscription,
}

impl Binding {
    /// Activates a consumer against the shared client.
    pub fn activate(client: &RealtimeClient, options: BindingOptions) -> Self {
        let on_notification = HandlerCell::new();
        let on_unread_count = HandlerCell::new();
        let on_channel_error = HandlerCell::new();
        let last_event = Arc::new(Mutex::new(None));

        let subscriptions = vec![
            Self::register(client, EventKind::Notification, &on_notification, &last_event),
            Self::register(client, EventKind::UnreadCount, &on_unread_count, &last_event),
            Self::register(client, EventKind::ChannelError, &on_channel_error, &last_event),
        ];

        // Read the current state, then subscribe to future transitions.
        // These two calls must stay adjacent.
        let state = Arc::new(Mutex::new(client.get_state()));
        let mirror = Arc::clone(&state);
        let state_subscription = client.on_state_change(move |snapshot| {
            *mirror.lock().unwrap() = snapshot;
        });

        let binding = Self {
            client: client.clone(),
            auth_token: options.auth_token,
            connect_guard: Arc::new(AtomicBool::new(false)),
            state,
            last_event,
            on_notification,
            on_unread_count,
            on_channel_error,
            subscriptions,
            _state_subscription: state_subscription,
        };
        binding.maybe_connect();
        binding
    }

    fn register(
        client: &RealtimeClient,
        event: EventKind,
        cell: &HandlerCell,
        last_event: &Arc<Mutex<Option<Value>>>,
    ) -> Subscription {
        let cell = cell.clone();
        let last_event = Arc::clone(last_event);
        client.subscribe(event, move |payload| {
            *last_event.lock().unwrap() = Some(payload.clone());
            cell.invoke(payload);
        })
    }

    /// Connects the shared client when this consumer is authenticated,
    /// nothing is connected or connecting, and no attempt of our own is
    /// already in flight.
    fn maybe_connect(&self) {
        let Some(token) = self.auth_token.clone() else {
            return;
        };

        let snapshot = self.client.get_state();
        if snapshot.is_connected || snapshot.is_connecting {
            return;
        }
        if self
            .connect_guard
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let client = self.client.clone();
        let guard = Arc::clone(&self.connect_guard);
        tokio::spawn(async move {
            if let Err(e) = client.connect(&token).await {
                tracing::debug!(error = %e, "binding-initiated connect failed");
            }
            guard.store(false, Ordering::Release);
        });
    }

    /// Explicit connect action (user-triggered).
    pub async fn connect(&self) -> Result<()> {
        match &self.auth_token {
            Some(token) => self.client.connect(token).await,
            None => Err(RealtimeError::Auth("binding has no auth token".to_string())),
        }
    }

    /// Explicit disconnect action (user-triggered). Never called by
    /// binding teardown.
    pub async fn disconnect(&self) {
        self.client.disconnect().await;
    }

    /// Connection state as this binding last saw it, by copy.
    pub fn state(&self) -> ConnectionState {
        self.state.lock().unwrap().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().is_connected
    }

    pub fn is_connecting(&self) -> bool {
        self.state.lock().unwrap().is_connecting
    }

    /// Last surfaced connection error; cleared by the first successful
    /// transition after it.
    pub fn error(&self) -> Option<String> {
        self.state.lock().unwrap().error.clone()
    }

    /// Most recently delivered event payload, for inspection.
    pub fn last_event(&self) -> Option<Value> {
        self.last_event.lock().unwrap().clone()
    }

    /// Replaces the notification callback; the bus registration keeps its
    /// identity.
    pub fn set_on_notification<F>(&self, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.on_notification.set(handler);
    }

    /// Replaces the unread-count callback.
    pub fn set_on_unread_count<F>(&self, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.on_unread_count.set(handler);
    }

    /// Replaces the channel-error callback.
    pub fn set_on_channel_error<F>(&self, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.on_channel_error.set(handler);
    }

    /// Drops every registration this binding holds. The shared connection
    /// is untouched.
    pub fn deactivate(mut self) {
        self.subscriptions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RealtimeClientOptions;
    use crate::types::message::EventMessage;
    use crate::websocket::mock::MockFactory;
    use serde_json::json;
    use std::time::Duration;

    fn test_client(factory: Arc<MockFactory>) -> RealtimeClient {
        RealtimeClient::builder(
            "wss://realtime.test/socket",
            RealtimeClientOptions {
                heartbeat_interval: Some(0),
                backoff_jitter: Some(0.0),
                ..Default::default()
            },
        )
        .unwrap()
        .with_transport_factory(factory)
        .build()
    }

    fn authed() -> BindingOptions {
        BindingOptions {
            auth_token: Some("tok".to_string()),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_racing_activations_open_one_connection() {
        let factory = MockFactory::new();
        let client = test_client(Arc::clone(&factory));

        let first = Binding::activate(&client, authed());
        let second = Binding::activate(&client, authed());
        settle().await;

        assert_eq!(factory.attempts(), 1);
        assert!(first.is_connected());
        assert!(second.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthenticated_binding_never_connects() {
        let factory = MockFactory::new();
        let client = test_client(Arc::clone(&factory));

        let binding = Binding::activate(&client, BindingOptions::default());
        settle().await;

        assert_eq!(factory.attempts(), 0);
        assert!(!binding.is_connected());
        assert!(matches!(
            binding.connect().await,
            Err(RealtimeError::Auth(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deactivation_leaves_shared_connection_up() {
        let factory = MockFactory::new();
        let client = test_client(Arc::clone(&factory));

        let first = Binding::activate(&client, authed());
        let second = Binding::activate(&client, authed());
        settle().await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        second.set_on_notification(move |payload| sink.lock().unwrap().push(payload));

        first.deactivate();
        settle().await;

        assert!(client.is_connected());
        factory.push(EventMessage::new(
            EventKind::Notification,
            json!({ "id": "n1" }),
        ));
        settle().await;

        assert_eq!(*seen.lock().unwrap(), vec![json!({ "id": "n1" })]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_replacement_keeps_registration() {
        let factory = MockFactory::new();
        let client = test_client(Arc::clone(&factory));
        let binding = Binding::activate(&client, authed());
        settle().await;

        let registered = client.bus.handler_count(&EventKind::Notification);
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&log);
        binding.set_on_notification(move |payload| {
            first.lock().unwrap().push(format!("first:{payload}"))
        });
        factory.push(EventMessage::new(EventKind::Notification, json!(1)));
        settle().await;

        let second = Arc::clone(&log);
        binding.set_on_notification(move |payload| {
            second.lock().unwrap().push(format!("second:{payload}"))
        });
        factory.push(EventMessage::new(EventKind::Notification, json!(2)));
        settle().await;

        assert_eq!(*log.lock().unwrap(), vec!["first:1", "second:2"]);
        // Swapping callbacks never re-subscribed.
        assert_eq!(
            client.bus.handler_count(&EventKind::Notification),
            registered
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_event_is_inspectable() {
        let factory = MockFactory::new();
        let client = test_client(Arc::clone(&factory));
        let binding = Binding::activate(&client, authed());
        settle().await;

        assert_eq!(binding.last_event(), None);
        factory.push(EventMessage::new(
            EventKind::UnreadCount,
            json!({ "count": 3 }),
        ));
        settle().await;

        assert_eq!(binding.last_event(), Some(json!({ "count": 3 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_surfaced_then_cleared_on_reconnect() {
        let factory = MockFactory::new();
        let client = test_client(Arc::clone(&factory));
        let binding = Binding::activate(&client, authed());
        settle().await;
        assert!(binding.is_connected());

        factory.drop_connection();
        settle().await;
        assert!(!binding.is_connected());
        assert!(binding.error().is_some());

        // The retry loop reconnects; the surfaced error clears on the
        // successful transition.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(binding.is_connected());
        assert_eq!(binding.error(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activation_skips_connect_when_already_connected() {
        let factory = MockFactory::new();
        let client = test_client(Arc::clone(&factory));
        client.connect("tok").await.unwrap();

        let binding = Binding::activate(&client, authed());
        settle().await;

        assert_eq!(factory.attempts(), 1);
        assert!(binding.is_connected());
    }
}
