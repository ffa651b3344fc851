use std::sync::Arc;

use async_trait::async_trait;

use super::queue::MessageQueue;
use crate::{
    agent::{InboundMessageContext, MessageHandler, OutboundMessage},
    messages::{
        verkey_from_key_reference, AgentMessage, DeliveryRequest, MessageDelivery, MessagesReceived,
        Status, StatusRequest,
    },
    Result,
};

/// Holder side of `messagepickup/2.0` over the store-and-forward queue.
///
/// Delivered messages stay queued until the recipient lists them in a
/// `messages-received`.
#[derive(Clone)]
pub struct MessagePickupHandler {
    queue: Arc<dyn MessageQueue>,
}

impl MessagePickupHandler {
    pub fn new(queue: Arc<dyn MessageQueue>) -> Self {
        MessagePickupHandler { queue }
    }

    async fn count(&self, connection_id: &str, recipient_key: Option<&str>) -> Result<usize> {
        match recipient_key {
            None => self.queue.count(connection_id).await,
            Some(key) => Ok(self.queue.peek(connection_id, Some(key), usize::MAX).await?.len()),
        }
    }
}

/// Queue entries are keyed by base58 verkey, requests may use `did:key`.
fn queue_key(recipient_key: &Option<String>) -> Result<Option<String>> {
    recipient_key.as_deref().map(verkey_from_key_reference).transpose()
}

#[async_trait]
impl MessageHandler<StatusRequest> for MessagePickupHandler {
    async fn handle(
        &self,
        message: &StatusRequest,
        context: &InboundMessageContext,
    ) -> Result<Option<OutboundMessage>> {
        let connection = context.assert_ready_connection()?;
        let key = queue_key(&message.recipient_key)?;
        let count = self.count(&connection.id, key.as_deref()).await?;
        let status = Status::new(context.message.thread_id(), message.recipient_key.clone(), count);
        Ok(Some(OutboundMessage::reply(AgentMessage::new(status)?, context)?))
    }
}

#[async_trait]
impl MessageHandler<DeliveryRequest> for MessagePickupHandler {
    async fn handle(
        &self,
        message: &DeliveryRequest,
        context: &InboundMessageContext,
    ) -> Result<Option<OutboundMessage>> {
        let connection = context.assert_ready_connection()?;
        let key = queue_key(&message.recipient_key)?;
        let queued = self.queue.peek(&connection.id, key.as_deref(), message.limit).await?;
        let thid = context.message.thread_id();
        let reply = if queued.is_empty() {
            AgentMessage::new(Status::new(thid, message.recipient_key.clone(), 0))?
        } else {
            debug!("delivering {} queued message(s) to connection {}", queued.len(), connection.id);
            AgentMessage::new(MessageDelivery::new(
                thid,
                message.recipient_key.clone(),
                queued.into_iter().map(|m| (m.id, m.payload)).collect(),
            )?)?
        };
        Ok(Some(OutboundMessage::reply(reply, context)?))
    }
}

#[async_trait]
impl MessageHandler<MessagesReceived> for MessagePickupHandler {
    async fn handle(
        &self,
        message: &MessagesReceived,
        context: &InboundMessageContext,
    ) -> Result<Option<OutboundMessage>> {
        let connection = context.assert_ready_connection()?;
        if !message.message_id_list.is_empty() {
            let removed = self.queue.remove(&connection.id, &message.message_id_list).await?;
            debug!("{} picked up message(s) removed for connection {}", removed, connection.id);
        }
        let count = self.queue.count(&connection.id).await?;
        let status = Status::new(context.message.thread_id(), None, count);
        Ok(Some(OutboundMessage::reply(AgentMessage::new(status)?, context)?))
    }
}
