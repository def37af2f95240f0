use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::{EventBus, EventKind};
use crate::classifier::{ErrorReport, ErrorSink};
use crate::client::ClientState;
use crate::types::constants::REALTIME_CONTEXT;
use crate::types::message::EventMessage;

/// Routes inbound messages to the appropriate handlers.
#[derive(Clone)]
pub struct MessageRouter {
    bus: EventBus,
    errors: Arc<dyn ErrorSink>,
    state: Arc<Mutex<ClientState>>,
}

impl MessageRouter {
    pub(crate) fn new(
        bus: EventBus,
        errors: Arc<dyn ErrorSink>,
        state: Arc<Mutex<ClientState>>,
    ) -> Self {
        Self { bus, errors, state }
    }

    /// Routes one message.
    ///
    /// Heartbeat acks are internal bookkeeping. Channel errors are
    /// reported to the error sink and then fanned out like any other
    /// event; they never touch connection state.
    pub(crate) fn route(&self, message: EventMessage) {
        tracing::debug!(event = %message.event, "routing inbound message");

        match &message.event {
            EventKind::Heartbeat => self.handle_heartbeat_ack(&message),
            EventKind::ChannelError => {
                self.report_channel_error(&message.payload);
                self.bus.emit(&message.event, message.payload);
            }
            _ => self.bus.emit(&message.event, message.payload),
        }
    }

    /// Clears the pending ref when the server acknowledges a heartbeat.
    fn handle_heartbeat_ack(&self, message: &EventMessage) {
        let ack_ref = message.payload.get("ref").and_then(Value::as_u64);
        let mut state = self.state.lock().unwrap();
        if ack_ref.is_some() && state.pending_heartbeat == ack_ref {
            state.pending_heartbeat = None;
            tracing::debug!(heartbeat_ref = ack_ref.unwrap_or_default(), "heartbeat ack");
        }
    }

    fn report_channel_error(&self, payload: &Value) {
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("channel error")
            .to_string();
        let code = payload
            .get("code")
            .and_then(Value::as_str)
            .map(str::to_string);

        self.errors
            .report(ErrorReport::new(message, code, REALTIME_CONTEXT));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::Backoff;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingSink {
        reports: Mutex<Vec<ErrorReport>>,
    }

    impl ErrorSink for RecordingSink {
        fn report(&self, report: ErrorReport) {
            self.reports.lock().unwrap().push(report);
        }
    }

    fn router_fixture() -> (MessageRouter, EventBus, Arc<RecordingSink>, Arc<Mutex<ClientState>>) {
        let bus = EventBus::new();
        let sink = Arc::new(RecordingSink::default());
        let state = Arc::new(Mutex::new(ClientState::new(Backoff::default())));
        let router = MessageRouter::new(
            bus.clone(),
            Arc::clone(&sink) as Arc<dyn ErrorSink>,
            Arc::clone(&state),
        );
        (router, bus, sink, state)
    }

    #[test]
    fn test_routes_events_to_bus() {
        let (router, bus, _, _) = router_fixture();
        let log = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&log);
        let _sub = bus.subscribe(EventKind::Notification, move |payload| {
            seen.lock().unwrap().push(payload);
        });

        router.route(EventMessage::new(
            EventKind::Notification,
            json!({ "id": "n1" }),
        ));

        assert_eq!(*log.lock().unwrap(), vec![json!({ "id": "n1" })]);
    }

    #[test]
    fn test_channel_error_reported_and_fanned_out() {
        let (router, bus, sink, _) = router_fixture();
        let log = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&log);
        let _sub = bus.subscribe(EventKind::ChannelError, move |payload| {
            seen.lock().unwrap().push(payload);
        });

        router.route(EventMessage::new(
            EventKind::ChannelError,
            json!({ "message": "subscription rejected", "code": "forbidden" }),
        ));

        let reports = sink.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].message, "subscription rejected");
        assert_eq!(reports[0].code.as_deref(), Some("forbidden"));
        assert_eq!(reports[0].context, REALTIME_CONTEXT);

        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_heartbeat_ack_clears_pending_ref() {
        let (router, _, _, state) = router_fixture();
        state.lock().unwrap().pending_heartbeat = Some(7);

        router.route(EventMessage::new(EventKind::Heartbeat, json!({ "ref": 7 })));
        assert_eq!(state.lock().unwrap().pending_heartbeat, None);
    }

    #[test]
    fn test_stale_heartbeat_ack_ignored() {
        let (router, _, _, state) = router_fixture();
        state.lock().unwrap().pending_heartbeat = Some(8);

        router.route(EventMessage::new(EventKind::Heartbeat, json!({ "ref": 7 })));
        assert_eq!(state.lock().unwrap().pending_heartbeat, Some(8));
    }
}
