use std::sync::Arc;

use super::context::OutboundMessage;
use crate::{
    config::AgentConfig,
    connections::ConnectionRecord,
    dids::{DidCommService, IdentityResolver},
    envelope::{EnvelopeKeys, EnvelopeService},
    messages::{EncryptedMessage, PlaintextMessage},
    routing::MessageQueue,
    transport::{OutboundPackage, OutboundTransport, SessionRecord, SessionRegistry, QUEUE_ENDPOINT},
    Error, Result,
};

/// Outbound send path: return routed session, then the peer's services,
/// then its queue service.
pub struct MessageSender {
    envelopes: Arc<EnvelopeService>,
    sessions: Arc<SessionRegistry>,
    identities: Arc<dyn IdentityResolver>,
    transports: Vec<Arc<dyn OutboundTransport>>,
    queue: Option<Arc<dyn MessageQueue>>,
    config: Arc<AgentConfig>,
}

/// How an outbound message left the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Over the saved session with this id.
    Session(String),
    /// Handed to an outbound transport.
    Transport,
    /// Stored in the queue for pickup.
    Queued,
}

/// Destination services of a relationship with the queue service split off.
struct Services {
    direct: Vec<DidCommService>,
    queue: Option<DidCommService>,
}

impl MessageSender {
    pub fn new(
        envelopes: Arc<EnvelopeService>,
        sessions: Arc<SessionRegistry>,
        identities: Arc<dyn IdentityResolver>,
        transports: Vec<Arc<dyn OutboundTransport>>,
        queue: Option<Arc<dyn MessageQueue>>,
        config: Arc<AgentConfig>,
    ) -> Self {
        MessageSender {
            envelopes,
            sessions,
            identities,
            transports,
            queue,
            config,
        }
    }

    pub async fn send_message(&self, outbound: &OutboundMessage) -> Result<()> {
        self.deliver(outbound).await.map(|_| ())
    }

    pub async fn deliver(&self, outbound: &OutboundMessage) -> Result<Delivery> {
        let connection = &outbound.connection;
        let plaintext = outbound
            .message
            .to_plaintext(outbound.version, self.config.use_did_sov_prefix_where_allowed);

        if let Some(session) = self.find_session(outbound).await {
            if session
                .inbound_message
                .has_return_routing(Some(outbound.message.thread_id()))
            {
                match self.send_over_session(&plaintext, &session, connection).await {
                    Ok(()) => return Ok(Delivery::Session(session.id().to_string())),
                    Err(e) => warn!(
                        "sending over session {} failed, trying services: {}",
                        session.id(),
                        e
                    ),
                }
            }
        }

        let services = self.retrieve_services(connection).await?;
        for service in &services.direct {
            let keys = EnvelopeKeys {
                recipient_keys: service.recipient_keys.clone(),
                routing_keys: service.routing_keys.clone(),
                sender_key: Some(connection.verkey.clone()),
            };
            let result = async {
                let payload = self.envelopes.pack(&plaintext, &keys).await?;
                let mut package = OutboundPackage::new(payload);
                package.response_requested = outbound.message.has_any_return_route();
                self.send_to_service(package, service, connection).await
            }
            .await;
            match result {
                Ok(()) => return Ok(Delivery::Transport),
                Err(e) => warn!("sending to service {} failed: {}", service.id, e),
            }
        }

        if let Some(service) = services.queue {
            let keys = EnvelopeKeys {
                recipient_keys: service.recipient_keys.clone(),
                routing_keys: service.routing_keys.clone(),
                sender_key: Some(connection.verkey.clone()),
            };
            let payload = self.envelopes.pack(&plaintext, &keys).await?;
            return self
                .enqueue(connection, service.recipient_keys.first().map(String::as_str), payload)
                .await
                .map(|_| Delivery::Queued);
        }

        error!(
            "message {} is undeliverable to connection {}",
            outbound.message.id(),
            connection.id
        );
        Err(Error::Undeliverable(connection.id.clone()))
    }

    /// Delivers an already encrypted blob, as a relay does with forwarded
    /// messages. The blob is never repacked.
    pub async fn send_package(
        &self,
        payload: EncryptedMessage,
        connection: &ConnectionRecord,
        recipient_key: Option<&str>,
    ) -> Result<()> {
        let mut package = OutboundPackage::new(payload);
        package.connection_id = Some(connection.id.clone());
        package.recipient_key = recipient_key.map(String::from);

        if let Some(session) = self.sessions.find_by_connection_id(&connection.id).await {
            if session.inbound_message.has_return_routing(None) {
                match session.session.send(package.clone()).await {
                    Ok(()) => return Ok(()),
                    Err(e) => warn!(
                        "sending package over session {} failed, trying services: {}",
                        session.id(),
                        e
                    ),
                }
            }
        }

        let services = self.retrieve_services(connection).await?;
        for service in &services.direct {
            match self.send_to_service(package.clone(), service, connection).await {
                Ok(()) => return Ok(()),
                Err(e) => warn!("sending package to service {} failed: {}", service.id, e),
            }
        }

        if services.queue.is_some() {
            return self.enqueue(connection, recipient_key, package.payload).await;
        }

        error!("package is undeliverable to connection {}", connection.id);
        Err(Error::Undeliverable(connection.id.clone()))
    }

    async fn find_session(&self, outbound: &OutboundMessage) -> Option<SessionRecord> {
        if let Some(session_id) = &outbound.session_id {
            if let Some(session) = self.sessions.find(session_id).await {
                return Some(session);
            }
        }
        self.sessions.find_by_connection_id(&outbound.connection.id).await
    }

    async fn send_over_session(
        &self,
        plaintext: &PlaintextMessage,
        session: &SessionRecord,
        connection: &ConnectionRecord,
    ) -> Result<()> {
        let payload = self.envelopes.pack(plaintext, &session.keys).await?;
        let mut package = OutboundPackage::new(payload);
        package.connection_id = Some(connection.id.clone());
        debug!("replying over {} session {}", session.session.kind(), session.id());
        session.session.send(package).await
    }

    async fn send_to_service(
        &self,
        mut package: OutboundPackage,
        service: &DidCommService,
        connection: &ConnectionRecord,
    ) -> Result<()> {
        let scheme = service.protocol_scheme();
        let transport = self
            .transports
            .iter()
            .find(|t| t.supported_schemes().iter().any(|s| s == scheme))
            .ok_or_else(|| Error::Transport(format!("no outbound transport for scheme {}", scheme)))?;
        package.endpoint = Some(service.service_endpoint.clone());
        package.connection_id = Some(connection.id.clone());
        debug!("sending to {} for connection {}", service.service_endpoint, connection.id);
        transport.send(package).await
    }

    async fn enqueue(
        &self,
        connection: &ConnectionRecord,
        recipient_key: Option<&str>,
        payload: EncryptedMessage,
    ) -> Result<()> {
        match &self.queue {
            Some(queue) => {
                debug!("queueing message for connection {}", connection.id);
                queue.add(&connection.id, recipient_key, payload).await
            }
            None => {
                error!("connection {} uses a queue service but no queue is configured", connection.id);
                Err(Error::Undeliverable(connection.id.clone()))
            }
        }
    }

    /// Inline service first, else the services of their DID document,
    /// ordered by transport priority.
    async fn retrieve_services(&self, connection: &ConnectionRecord) -> Result<Services> {
        let mut services = match (&connection.their_service, &connection.their_did) {
            (Some(service), _) => vec![service.clone()],
            (None, Some(their_did)) => self
                .identities
                .resolve_did(their_did)
                .await?
                .map(|document| document.didcomm_services())
                .unwrap_or_default(),
            (None, None) => vec![],
        };

        let queue = services
            .iter()
            .position(|s| s.service_endpoint == QUEUE_ENDPOINT)
            .map(|i| services.remove(i));

        if let Some(priority) = &self.config.transport_priority {
            let rank = |service: &DidCommService| {
                priority
                    .schemes
                    .iter()
                    .position(|s| s == service.protocol_scheme())
            };
            if priority.restrictive {
                services.retain(|s| rank(s).is_some());
            }
            services.sort_by_key(|s| rank(s).unwrap_or(usize::MAX));
        }

        Ok(Services {
            direct: services,
            queue,
        })
    }
}
