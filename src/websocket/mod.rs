// Transport layer - the factory seam plus the WebSocket implementation
pub mod factory;
#[cfg(test)]
pub(crate) mod mock;

pub use factory::WebSocketFactory;

use std::pin::Pin;

use futures::future::BoxFuture;
use futures::{Sink, Stream};

use crate::types::error::{RealtimeError, Result};
use crate::types::message::EventMessage;

/// Write half of an established transport connection.
pub type TransportSink = Pin<Box<dyn Sink<EventMessage, Error = RealtimeError> + Send>>;

/// Read half of an established transport connection. An `Err` item or the
/// end of the stream both mean the transport is gone.
pub type TransportStream = Pin<Box<dyn Stream<Item = Result<EventMessage>> + Send>>;

/// Opens transport connections.
///
/// The production implementation speaks WebSocket; tests substitute an
/// in-memory pair so the connection lifecycle runs without a network.
pub trait TransportFactory: Send + Sync {
    /// Performs the handshake against `url` and returns the split halves
    /// of the established connection.
    fn connect<'a>(&'a self, url: &'a str)
    -> BoxFuture<'a, Result<(TransportSink, TransportStream)>>;
}
