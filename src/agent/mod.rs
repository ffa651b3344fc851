//! The agent facade: receive pipeline, dispatch and outbound sending.
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    config::AgentConfig,
    connections::{ConnectionRecord, ConnectionRepository},
    crypto::{CryptoProvider, JoseProvider},
    dids::IdentityResolver,
    envelope::{EnvelopeKeys, EnvelopeService},
    messages::{
        AgentMessage, DeliveryRequest, DidCommMessage, DidCommVersion, EncryptedMessage, ForwardMessage,
        ForwardMessageV2, KeylistUpdate, MessagesReceived, StatusRequest,
    },
    routing::{
        ForwardHandler, ForwardV2Handler, InMemoryMessageQueue, KeylistUpdateHandler, MediatorService,
        MessagePickupHandler, MessageQueue,
    },
    transport::{OutboundTransport, SessionRegistry, TransportSession},
    Error, Result,
};

mod context;
mod correlator;
mod dispatcher;
mod receiver;
mod resolver;
mod sender;

pub use context::{InboundMessageContext, OutboundMessage};
pub use correlator::ConnectionCorrelator;
pub use dispatcher::{Dispatcher, DispatcherBuilder, HandlerRegistry, MessageHandler};
pub use receiver::MessageReceiver;
pub use resolver::MessageResolver;
pub use sender::{Delivery, MessageSender};

pub struct Agent {
    config: Arc<AgentConfig>,
    envelopes: Arc<EnvelopeService>,
    receiver: Arc<MessageReceiver>,
    sender: Arc<MessageSender>,
    sessions: Arc<SessionRegistry>,
    mediator: Option<Arc<MediatorService>>,
    connections: Arc<dyn ConnectionRepository>,
}

impl Agent {
    pub fn builder(
        config: AgentConfig,
        crypto: Arc<dyn CryptoProvider>,
        jose: Arc<dyn JoseProvider>,
        identities: Arc<dyn IdentityResolver>,
        connections: Arc<dyn ConnectionRepository>,
    ) -> AgentBuilder {
        AgentBuilder {
            config,
            crypto,
            jose,
            identities,
            connections,
            transports: vec![],
            queue: None,
            handlers: DispatcherBuilder::new(),
            mediator: false,
        }
    }

    /// Runs one inbound message through the pipeline. A reply sent back over
    /// `session` is returned.
    pub async fn receive(
        &self,
        raw: &[u8],
        session: Option<Arc<dyn TransportSession>>,
        connection: Option<ConnectionRecord>,
    ) -> Result<Option<OutboundMessage>> {
        self.receiver.receive(raw, session, connection).await
    }

    /// [`Agent::receive`] as an independent task.
    pub fn spawn_receive(
        &self,
        raw: Vec<u8>,
        session: Option<Arc<dyn TransportSession>>,
    ) -> JoinHandle<Result<Option<OutboundMessage>>> {
        let receiver = self.receiver.clone();
        tokio::spawn(async move { receiver.receive(&raw, session, None).await })
    }

    pub async fn pack(
        &self,
        message: &AgentMessage,
        version: DidCommVersion,
        keys: &EnvelopeKeys,
    ) -> Result<EncryptedMessage> {
        let plaintext = message.to_plaintext(version, self.config.use_did_sov_prefix_where_allowed);
        self.envelopes.pack(&plaintext, keys).await
    }

    pub async fn send(&self, outbound: &OutboundMessage) -> Result<()> {
        self.sender.send_message(outbound).await
    }

    /// Sends `message` to the relationship `connection_id`.
    pub async fn send_to<M: DidCommMessage>(&self, message: M, connection_id: &str) -> Result<()> {
        let connection = self
            .connections
            .find_by_id(connection_id)
            .await?
            .ok_or_else(|| Error::RecordNotFound(connection_id.into()))?;
        connection.assert_ready()?;
        self.send(&OutboundMessage::new(AgentMessage::new(message)?, connection)).await
    }

    pub async fn add_route(&self, key: &str, connection_id: &str) -> Result<()> {
        self.mediator()?.add_route(key, connection_id).await
    }

    pub async fn remove_route(&self, key: &str, connection_id: &str) -> Result<()> {
        self.mediator()?.remove_route(key, connection_id).await
    }

    /// Forgets a closed transport session.
    pub async fn close_session(&self, session_id: &str) {
        self.sessions.remove(session_id).await;
    }

    pub fn mediator(&self) -> Result<&MediatorService> {
        self.mediator
            .as_deref()
            .ok_or_else(|| Error::Generic(format!("agent {} is not a mediator", self.config.label)))
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn envelopes(&self) -> &EnvelopeService {
        &self.envelopes
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

pub struct AgentBuilder {
    config: AgentConfig,
    crypto: Arc<dyn CryptoProvider>,
    jose: Arc<dyn JoseProvider>,
    identities: Arc<dyn IdentityResolver>,
    connections: Arc<dyn ConnectionRepository>,
    transports: Vec<Arc<dyn OutboundTransport>>,
    queue: Option<Arc<dyn MessageQueue>>,
    handlers: DispatcherBuilder,
    mediator: bool,
}

impl AgentBuilder {
    pub fn transport(mut self, transport: Arc<dyn OutboundTransport>) -> Self {
        self.transports.push(transport);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn MessageQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn handler<M, H>(mut self, handler: H) -> Self
    where
        M: DidCommMessage,
        H: MessageHandler<M> + 'static,
    {
        self.handlers.add::<M, H>(handler);
        self
    }

    /// Acts as a relay: registers forward, keylist update and message pickup
    /// handlers.
    pub fn mediator(mut self) -> Self {
        self.mediator = true;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let AgentBuilder {
            config,
            crypto,
            jose,
            identities,
            connections,
            transports,
            queue,
            mut handlers,
            mediator,
        } = self;
        let config = Arc::new(config);
        let envelopes = Arc::new(
            EnvelopeService::new(crypto, jose, identities.clone())
                .with_did_sov_prefix(config.use_did_sov_prefix_where_allowed),
        );
        let sessions = Arc::new(SessionRegistry::new());
        let queue = match (queue, mediator) {
            (None, true) => Some(Arc::new(InMemoryMessageQueue::new()) as Arc<dyn MessageQueue>),
            (queue, _) => queue,
        };
        let sender = Arc::new(MessageSender::new(
            envelopes.clone(),
            sessions.clone(),
            identities.clone(),
            transports,
            queue.clone(),
            config.clone(),
        ));

        let mediator = match (mediator, queue) {
            (true, Some(queue)) => {
                let pickup = MessagePickupHandler::new(queue.clone());
                handlers.add::<StatusRequest, _>(pickup.clone());
                handlers.add::<DeliveryRequest, _>(pickup.clone());
                handlers.add::<MessagesReceived, _>(pickup);
                let service = Arc::new(MediatorService::new(
                    connections.clone(),
                    sender.clone(),
                    queue,
                    config.forwarding_strategy,
                ));
                handlers.add::<ForwardMessage, _>(ForwardHandler::new(service.clone()));
                handlers.add::<ForwardMessageV2, _>(ForwardV2Handler::new(service.clone()));
                handlers.add::<KeylistUpdate, _>(KeylistUpdateHandler::new(service.clone()));
                Some(service)
            }
            _ => None,
        };

        let registry = Arc::new(handlers.build()?);
        let receiver = Arc::new(MessageReceiver::new(
            envelopes.clone(),
            ConnectionCorrelator::new(identities, connections.clone()),
            MessageResolver::new(registry.clone()),
            Dispatcher::new(registry, sender.clone(), sessions.clone()),
            sessions.clone(),
            sender.clone(),
        ));
        info!("agent {} ready", config.label);

        Ok(Agent {
            config,
            envelopes,
            receiver,
            sender,
            sessions,
            mediator,
            connections,
        })
    }
}
