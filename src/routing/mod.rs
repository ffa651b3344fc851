//! Relay routing table, onion construction and store-and-forward with
//! message pickup.
mod mediator;
pub mod onion;
mod pickup;
mod queue;
mod table;

pub use mediator::{ForwardHandler, ForwardV2Handler, KeylistUpdateHandler, MediatorService};
pub use pickup::MessagePickupHandler;
pub use queue::{InMemoryMessageQueue, MessageQueue, QueuedMessage};
pub use table::RoutingTable;
