//! # pulselink
//!
//! Realtime notification delivery client: one persistent connection per
//! process, automatic reconnection with bounded exponential backoff, and
//! fan-out of inbound events to any number of short-lived consumers.
//!
//! A [`RealtimeClient`] owns the connection lifecycle; consumers attach
//! through [`Binding`]s, which register durable event subscriptions and
//! mirror connection-state transitions without ever owning the shared
//! connection themselves.
//!
//! ## Example
//!
//! ```no_run
//! use pulselink::{Binding, BindingOptions, RealtimeClient, RealtimeClientOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RealtimeClient::new(
//!         "wss://realtime.example.com/socket",
//!         RealtimeClientOptions::default(),
//!     )?;
//!
//!     let binding = Binding::activate(&client, BindingOptions {
//!         auth_token: Some("bearer-token".to_string()),
//!     });
//!     binding.set_on_notification(|payload| {
//!         println!("notification: {payload}");
//!     });
//!
//!     // ... consumer lifetime ...
//!
//!     binding.deactivate();
//!     Ok(())
//! }
//! ```

pub mod binding;
pub mod classifier;
pub mod client;
pub mod infrastructure;
pub mod messaging;
pub mod types;
pub mod websocket;

pub use binding::{Binding, BindingOptions, HandlerCell};
pub use classifier::{ClassifiedError, ErrorClassifier, ErrorReport, ErrorSink, Severity};
pub use client::{
    ConnectionManager, ConnectionState, RealtimeClient, RealtimeClientBuilder,
    RealtimeClientOptions,
};
pub use messaging::{EventBus, EventKind, StateBroadcaster, StateSubscription, Subscription};
pub use types::{EventMessage, RealtimeError, Result};
pub use websocket::{TransportFactory, TransportSink, TransportStream, WebSocketFactory};
