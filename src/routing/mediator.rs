use std::{convert::TryFrom, sync::Arc};

use async_trait::async_trait;

use super::{queue::MessageQueue, table::RoutingTable};
use crate::{
    agent::{InboundMessageContext, MessageHandler, MessageSender, OutboundMessage},
    config::MessageForwardingStrategy,
    connections::{ConnectionRecord, ConnectionRepository},
    messages::{
        verkey_from_key_reference, AgentMessage, ForwardEnvelope, ForwardMessage, ForwardMessageV2,
        KeylistUpdate, KeylistUpdateAction, KeylistUpdateResponse, KeylistUpdateResult,
        KeylistUpdated,
    },
    Error, Result,
};

/// Relay role: owns the routing table and delivers forwarded blobs.
pub struct MediatorService {
    routes: RoutingTable,
    connections: Arc<dyn ConnectionRepository>,
    sender: Arc<MessageSender>,
    queue: Arc<dyn MessageQueue>,
    strategy: MessageForwardingStrategy,
}

impl MediatorService {
    pub fn new(
        connections: Arc<dyn ConnectionRepository>,
        sender: Arc<MessageSender>,
        queue: Arc<dyn MessageQueue>,
        strategy: MessageForwardingStrategy,
    ) -> Self {
        MediatorService {
            routes: RoutingTable::new(),
            connections,
            sender,
            queue,
            strategy,
        }
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub async fn add_route(&self, key: &str, connection_id: &str) -> Result<()> {
        self.routes.add(key, connection_id).await
    }

    pub async fn remove_route(&self, key: &str, connection_id: &str) -> Result<()> {
        self.routes.remove(key, connection_id).await
    }

    /// Delivers the opaque blob to the relationship owning `envelope.to`.
    /// The blob is never decrypted here.
    pub async fn forward(&self, envelope: ForwardEnvelope) -> Result<()> {
        let connection_id = self.routes.route(&envelope).await?;
        let connection = self
            .connections
            .find_by_id(&connection_id)
            .await?
            .ok_or_else(|| Error::RecordNotFound(connection_id.clone()))?;
        connection.assert_ready()?;
        debug!("forwarding message for {} to connection {}", envelope.to, connection.id);

        match self.strategy {
            MessageForwardingStrategy::QueueOnly => {
                self.queue
                    .add(&connection.id, Some(&envelope.to), envelope.message)
                    .await
            }
            MessageForwardingStrategy::DirectDelivery => {
                self.sender
                    .send_package(envelope.message, &connection, Some(&envelope.to))
                    .await
            }
        }
    }

    /// Applies each update for `connection` and reports a result per key.
    pub async fn update_keylist(
        &self,
        update: &KeylistUpdate,
        connection: &ConnectionRecord,
    ) -> Result<KeylistUpdateResponse> {
        let mut updated = Vec::with_capacity(update.updates.len());
        for item in &update.updates {
            let result = match verkey_from_key_reference(&item.recipient_key) {
                Ok(key) => self.apply(item.action, &key, &connection.id).await,
                Err(e) => {
                    warn!("rejecting keylist key {}: {}", item.recipient_key, e);
                    KeylistUpdateResult::ClientError
                }
            };
            updated.push(KeylistUpdated {
                recipient_key: item.recipient_key.clone(),
                action: item.action,
                result,
            });
        }
        Ok(KeylistUpdateResponse::new(&update.id, updated))
    }

    async fn apply(&self, action: KeylistUpdateAction, key: &str, connection_id: &str) -> KeylistUpdateResult {
        let outcome = match action {
            KeylistUpdateAction::Add => self.routes.add(key, connection_id).await,
            KeylistUpdateAction::Remove => self.routes.remove(key, connection_id).await,
        };
        match outcome {
            Ok(()) => KeylistUpdateResult::Success,
            Err(Error::DuplicateRoute(_)) => {
                if self.routes.find(key).await.as_deref() == Some(connection_id) {
                    KeylistUpdateResult::NoChange
                } else {
                    KeylistUpdateResult::ClientError
                }
            }
            Err(Error::NoRoute(_)) => KeylistUpdateResult::NoChange,
            Err(Error::RouteOwnershipMismatch { .. }) => KeylistUpdateResult::ClientError,
            Err(e) => {
                error!("keylist update for {} failed: {}", key, e);
                KeylistUpdateResult::ServerError
            }
        }
    }
}

/// `routing/1.0/forward`.
pub struct ForwardHandler {
    mediator: Arc<MediatorService>,
}

impl ForwardHandler {
    pub fn new(mediator: Arc<MediatorService>) -> Self {
        ForwardHandler { mediator }
    }
}

#[async_trait]
impl MessageHandler<ForwardMessage> for ForwardHandler {
    async fn handle(
        &self,
        message: &ForwardMessage,
        _: &InboundMessageContext,
    ) -> Result<Option<OutboundMessage>> {
        self.mediator.forward(message.clone().into()).await?;
        Ok(None)
    }
}

/// `routing/2.0/forward`.
pub struct ForwardV2Handler {
    mediator: Arc<MediatorService>,
}

impl ForwardV2Handler {
    pub fn new(mediator: Arc<MediatorService>) -> Self {
        ForwardV2Handler { mediator }
    }
}

#[async_trait]
impl MessageHandler<ForwardMessageV2> for ForwardV2Handler {
    async fn handle(
        &self,
        message: &ForwardMessageV2,
        _: &InboundMessageContext,
    ) -> Result<Option<OutboundMessage>> {
        self.mediator
            .forward(ForwardEnvelope::try_from(message.clone())?)
            .await?;
        Ok(None)
    }
}

/// `coordinate-mediation/1.0/keylist-update`, from a ready relationship.
pub struct KeylistUpdateHandler {
    mediator: Arc<MediatorService>,
}

impl KeylistUpdateHandler {
    pub fn new(mediator: Arc<MediatorService>) -> Self {
        KeylistUpdateHandler { mediator }
    }
}

#[async_trait]
impl MessageHandler<KeylistUpdate> for KeylistUpdateHandler {
    async fn handle(
        &self,
        message: &KeylistUpdate,
        context: &InboundMessageContext,
    ) -> Result<Option<OutboundMessage>> {
        let connection = context.assert_ready_connection()?;
        let response = self.mediator.update_keylist(message, connection).await?;
        Ok(Some(OutboundMessage::reply(AgentMessage::new(response)?, context)?))
    }
}
