// Messaging module - event fan-out and inbound routing
pub mod broadcaster;
pub mod bus;
pub mod event;
pub mod router;

pub use broadcaster::{StateBroadcaster, StateSubscription};
pub use bus::{EventBus, Subscription};
pub use event::EventKind;
pub use router::MessageRouter;
