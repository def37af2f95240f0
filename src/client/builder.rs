use std::sync::{Arc, Mutex};
use std::time::Duration;

use url::Url;

use super::connection::ConnectionManager;
use super::core::RealtimeClient;
use super::state::ClientState;
use crate::classifier::{ErrorClassifier, ErrorSink};
use crate::infrastructure::Backoff;
use crate::messaging::{EventBus, MessageRouter, StateBroadcaster};
use crate::types::constants::{
    DEFAULT_BACKOFF_CEILING, DEFAULT_BACKOFF_FLOOR, DEFAULT_BACKOFF_JITTER,
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_REPORT_COOLDOWN,
};
use crate::types::error::{RealtimeError, Result};
use crate::websocket::{TransportFactory, WebSocketFactory};

/// Tunables for [`RealtimeClient`]; `None` falls back to crate defaults.
#[derive(Debug, Clone, Default)]
pub struct RealtimeClientOptions {
    /// Handshake timeout in milliseconds
    pub handshake_timeout: Option<u64>,
    /// Heartbeat interval in milliseconds; `Some(0)` disables the probe
    pub heartbeat_interval: Option<u64>,
    /// Reconnection backoff floor in milliseconds
    pub backoff_floor: Option<u64>,
    /// Reconnection backoff ceiling in milliseconds
    pub backoff_ceiling: Option<u64>,
    /// Random jitter added to each delay, as a fraction of the base
    pub backoff_jitter: Option<f64>,
    /// Duplicate error-report suppression window in milliseconds
    pub report_cooldown: Option<u64>,
}

impl RealtimeClientOptions {
    pub(crate) fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout.unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT))
    }

    pub(crate) fn heartbeat_interval(&self) -> Option<Duration> {
        match self.heartbeat_interval.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub(crate) fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.backoff_floor.unwrap_or(DEFAULT_BACKOFF_FLOOR)),
            Duration::from_millis(self.backoff_ceiling.unwrap_or(DEFAULT_BACKOFF_CEILING)),
            self.backoff_jitter.unwrap_or(DEFAULT_BACKOFF_JITTER),
        )
    }

    pub(crate) fn report_cooldown(&self) -> Duration {
        Duration::from_millis(self.report_cooldown.unwrap_or(DEFAULT_REPORT_COOLDOWN))
    }
}

/// Builder for RealtimeClient that validates the endpoint and wires the
/// components together.
pub struct RealtimeClientBuilder {
    endpoint: String,
    options: RealtimeClientOptions,
    factory: Arc<dyn TransportFactory>,
    errors: Option<Arc<dyn ErrorSink>>,
}

impl RealtimeClientBuilder {
    /// Create a new builder
    pub fn new(endpoint: impl Into<String>, options: RealtimeClientOptions) -> Result<Self> {
        let endpoint = endpoint.into();

        let url = Url::parse(&endpoint)?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(RealtimeError::Connection(format!(
                    "unsupported endpoint scheme: {other}"
                )));
            }
        }

        Ok(Self {
            endpoint,
            options,
            factory: Arc::new(WebSocketFactory),
            errors: None,
        })
    }

    /// Replaces the transport factory. Tests use this to connect without
    /// a network.
    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Replaces the sink the core reports errors into.
    pub fn with_error_sink(mut self, errors: Arc<dyn ErrorSink>) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Build the client
    pub fn build(self) -> RealtimeClient {
        let broadcaster = StateBroadcaster::new();
        let bus = EventBus::new();
        let errors = self
            .errors
            .unwrap_or_else(|| Arc::new(ErrorClassifier::new(self.options.report_cooldown())));
        let state = Arc::new(Mutex::new(ClientState::new(self.options.backoff())));
        let router = MessageRouter::new(bus.clone(), Arc::clone(&errors), Arc::clone(&state));

        RealtimeClient {
            endpoint: self.endpoint,
            options: self.options,
            connection: Arc::new(ConnectionManager::new(broadcaster.clone())),
            bus,
            broadcaster,
            errors,
            state,
            router,
            factory: self.factory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_websocket_scheme() {
        let result =
            RealtimeClientBuilder::new("https://realtime.test", RealtimeClientOptions::default());
        assert!(matches!(result, Err(RealtimeError::Connection(_))));
    }

    #[test]
    fn test_rejects_malformed_endpoint() {
        let result =
            RealtimeClientBuilder::new("not a url", RealtimeClientOptions::default());
        assert!(matches!(result, Err(RealtimeError::UrlParse(_))));
    }

    #[test]
    fn test_options_fall_back_to_defaults() {
        let options = RealtimeClientOptions::default();

        assert_eq!(
            options.handshake_timeout(),
            Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT)
        );
        assert_eq!(
            options.heartbeat_interval(),
            Some(Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL))
        );
        assert_eq!(
            options.report_cooldown(),
            Duration::from_millis(DEFAULT_REPORT_COOLDOWN)
        );
    }

    #[test]
    fn test_zero_interval_disables_heartbeat() {
        let options = RealtimeClientOptions {
            heartbeat_interval: Some(0),
            ..Default::default()
        };
        assert_eq!(options.heartbeat_interval(), None);
    }
}
