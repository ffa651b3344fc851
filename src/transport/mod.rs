//! Transport collaborator contracts.
//!
//! Listeners and senders live outside this crate. Inbound transports hand
//! raw bytes and an optional reply capable [`TransportSession`] to the
//! agent, outbound ones implement [`OutboundTransport`].
use async_trait::async_trait;

use crate::{messages::EncryptedMessage, Result};

mod sessions;

pub use sessions::{SessionRecord, SessionRegistry};

/// Service endpoint of a peer that has no inbound endpoint and picks up
/// messages from a queue instead.
pub const QUEUE_ENDPOINT: &str = "didcomm:transport/queue";

/// An encrypted message ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundPackage {
    pub payload: EncryptedMessage,
    /// None when replying over a session.
    pub endpoint: Option<String>,
    pub connection_id: Option<String>,
    pub recipient_key: Option<String>,
    /// Keep the connection open for a return routed response.
    pub response_requested: bool,
}

impl OutboundPackage {
    pub fn new(payload: EncryptedMessage) -> Self {
        OutboundPackage {
            payload,
            endpoint: None,
            connection_id: None,
            recipient_key: None,
            response_requested: false,
        }
    }
}

/// Reply channel of a live bidirectional transport (e.g. a websocket).
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Transport assigned id.
    fn id(&self) -> &str;
    /// Transport name, for logs.
    fn kind(&self) -> &str;
    async fn send(&self, package: OutboundPackage) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait OutboundTransport: Send + Sync {
    /// URL schemes this transport can deliver to.
    fn supported_schemes(&self) -> Vec<String>;
    async fn send(&self, package: OutboundPackage) -> Result<()>;
}
