//! In-memory transport for tests: every `connect` hands out an
//! mpsc-backed pair the test can drive — inject inbound messages, observe
//! outbound ones, or drop the server end to simulate a lost connection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::SinkExt;
use futures::channel::mpsc;
use futures::future::BoxFuture;

use super::{TransportFactory, TransportSink, TransportStream};
use crate::types::error::{RealtimeError, Result};
use crate::types::message::EventMessage;

pub(crate) struct ServerEnd {
    inbound: mpsc::UnboundedSender<Result<EventMessage>>,
    outbound: mpsc::UnboundedReceiver<EventMessage>,
}

pub(crate) struct MockFactory {
    attempts: AtomicUsize,
    fail_next: AtomicUsize,
    server: Mutex<Option<ServerEnd>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            attempts: AtomicUsize::new(0),
            fail_next: AtomicUsize::new(0),
            server: Mutex::new(None),
        })
    }

    /// A factory whose next `count` handshakes are refused.
    pub fn failing(count: usize) -> Arc<Self> {
        let factory = Self::new();
        factory.fail_next.store(count, Ordering::SeqCst);
        factory
    }

    /// Handshakes attempted so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Delivers `message` to the client over the live connection.
    pub fn push(&self, message: EventMessage) {
        let guard = self.server.lock().unwrap();
        let server = guard.as_ref().expect("no live connection to push into");
        server
            .inbound
            .unbounded_send(Ok(message))
            .expect("client read half dropped");
    }

    /// Simulates an unexpected server-side drop.
    pub fn drop_connection(&self) {
        *self.server.lock().unwrap() = None;
    }

    /// Next message the client wrote, if any.
    pub fn try_outbound(&self) -> Option<EventMessage> {
        let mut guard = self.server.lock().unwrap();
        let server = guard.as_mut()?;
        server.outbound.try_next().ok().flatten()
    }
}

impl TransportFactory for MockFactory {
    fn connect<'a>(
        &'a self,
        _url: &'a str,
    ) -> BoxFuture<'a, Result<(TransportSink, TransportStream)>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);

            if self.fail_next.load(Ordering::SeqCst) > 0 {
                self.fail_next.fetch_sub(1, Ordering::SeqCst);
                return Err(RealtimeError::Connection(
                    "mock handshake refused".to_string(),
                ));
            }

            let (inbound_tx, inbound_rx) = mpsc::unbounded::<Result<EventMessage>>();
            let (outbound_tx, outbound_rx) = mpsc::unbounded::<EventMessage>();
            *self.server.lock().unwrap() = Some(ServerEnd {
                inbound: inbound_tx,
                outbound: outbound_rx,
            });

            let sink: TransportSink = Box::pin(
                outbound_tx.sink_map_err(|e| RealtimeError::Connection(e.to_string())),
            );
            let stream: TransportStream = Box::pin(inbound_rx);
            Ok((sink, stream))
        })
    }
}
