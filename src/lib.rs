//! DIDComm v1/v2 agent pipeline.
//!
//! Inbound bytes are classified, unpacked, correlated to a relationship,
//! resolved to a typed message and dispatched to a registered handler.
//! Outbound messages are packed (onion wrapped through relays when the
//! destination declares routing keys) and handed to a transport, or to a
//! live session for return routed replies.
#[macro_use]
extern crate serde;
#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

pub mod agent;
pub mod config;
pub mod connections;
pub mod crypto;
pub mod dids;
pub mod envelope;
mod error;
pub mod messages;
mod result;
pub mod routing;
pub mod transport;

pub use agent::{Agent, AgentBuilder, InboundMessageContext, MessageHandler, OutboundMessage};
pub use config::AgentConfig;
pub use error::*;
pub use result::Result;
