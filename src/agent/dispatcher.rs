use std::{marker::PhantomData, sync::Arc};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{
    context::{InboundMessageContext, OutboundMessage},
    sender::{Delivery, MessageSender},
};
use crate::{
    messages::{AgentMessage, DidCommMessage, ParsedMessageType},
    transport::SessionRegistry,
    Error, Result,
};

/// Protocol logic for one message schema.
#[async_trait]
pub trait MessageHandler<M: DidCommMessage>: Send + Sync {
    async fn handle(
        &self,
        message: &M,
        context: &InboundMessageContext,
    ) -> Result<Option<OutboundMessage>>;
}

#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn handle(&self, context: &InboundMessageContext) -> Result<Option<OutboundMessage>>;
}

struct TypedHandler<M, H> {
    handler: H,
    _message: PhantomData<fn() -> M>,
}

#[async_trait]
impl<M, H> ErasedHandler for TypedHandler<M, H>
where
    M: DidCommMessage,
    H: MessageHandler<M> + 'static,
{
    async fn handle(&self, context: &InboundMessageContext) -> Result<Option<OutboundMessage>> {
        let message = context.message.downcast_ref::<M>().ok_or_else(|| {
            Error::Generic(format!(
                "{} was not resolved to {}",
                context.message.message_type(),
                M::TYPE
            ))
        })?;
        self.handler.handle(message, context).await
    }
}

type ParseFn = fn(Map<String, Value>) -> Result<AgentMessage>;

/// Deserializes and validates canonical JSON as `M`.
fn parse_as<M: DidCommMessage>(canonical: Map<String, Value>) -> Result<AgentMessage> {
    let validation = |reason: String| Error::MessageValidation {
        message_type: M::TYPE.into(),
        reason,
    };
    let message: M = serde_json::from_value(Value::Object(canonical)).map_err(|e| validation(e.to_string()))?;
    message.validate().map_err(|e| match e {
        Error::MessageValidation { .. } => e,
        other => validation(other.to_string()),
    })?;
    AgentMessage::new(message)
}

pub(crate) struct Registration {
    pub(crate) message_type: &'static str,
    parsed: ParsedMessageType,
    pub(crate) parse: ParseFn,
    handler: Arc<dyn ErasedHandler>,
}

/// Immutable type URI to (schema, handler) map, built once at startup.
pub struct HandlerRegistry {
    registrations: Vec<Registration>,
}

impl HandlerRegistry {
    /// Exact match first, then a registration of another minor version.
    pub(crate) fn find(&self, message_type: &str) -> Option<&Registration> {
        if let Some(exact) = self.registrations.iter().find(|r| r.message_type == message_type) {
            return Some(exact);
        }
        let incoming: ParsedMessageType = message_type.parse().ok()?;
        self.registrations.iter().find(|r| r.parsed.can_handle(&incoming))
    }

    pub fn supported_types(&self) -> Vec<&'static str> {
        self.registrations.iter().map(|r| r.message_type).collect()
    }
}

#[derive(Default)]
pub struct DispatcherBuilder {
    registrations: Vec<Registration>,
    errors: Vec<Error>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M, H>(mut self, handler: H) -> Self
    where
        M: DidCommMessage,
        H: MessageHandler<M> + 'static,
    {
        self.add::<M, H>(handler);
        self
    }

    pub(crate) fn add<M, H>(&mut self, handler: H)
    where
        M: DidCommMessage,
        H: MessageHandler<M> + 'static,
    {
        match M::TYPE.parse::<ParsedMessageType>() {
            Ok(parsed) => self.registrations.push(Registration {
                message_type: M::TYPE,
                parsed,
                parse: parse_as::<M>,
                handler: Arc::new(TypedHandler {
                    handler,
                    _message: PhantomData,
                }),
            }),
            Err(e) => self.errors.push(e),
        }
    }

    /// Fails on unparsable type URIs and on two handlers for one type.
    pub fn build(mut self) -> Result<HandlerRegistry> {
        if !self.errors.is_empty() {
            return Err(self.errors.remove(0));
        }
        for (i, registration) in self.registrations.iter().enumerate() {
            if self.registrations[..i]
                .iter()
                .any(|r| r.message_type == registration.message_type)
            {
                return Err(Error::Generic(format!(
                    "duplicate handler for {}",
                    registration.message_type
                )));
            }
        }
        Ok(HandlerRegistry {
            registrations: self.registrations,
        })
    }
}

/// Runs handlers and routes what they return.
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    sender: Arc<MessageSender>,
    sessions: Arc<SessionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, sender: Arc<MessageSender>, sessions: Arc<SessionRegistry>) -> Self {
        Dispatcher {
            registry,
            sender,
            sessions,
        }
    }

    /// A reply that went back over the live session of `context` is
    /// returned. Otherwise it is sent through services and `None` is
    /// returned, in the background when there is no session.
    pub async fn dispatch(&self, context: &InboundMessageContext) -> Result<Option<OutboundMessage>> {
        let message_type = context.message.message_type();
        let registration = self
            .registry
            .find(message_type)
            .ok_or_else(|| Error::NoHandler(message_type.into()))?;
        debug!("dispatching {} message {}", message_type, context.message.id());

        let mut outbound = match registration.handler.handle(context).await? {
            Some(outbound) => outbound,
            None => return Ok(None),
        };

        if let Some(session_id) = &context.session_id {
            if self.sessions.find(session_id).await.is_some() {
                outbound.session_id = Some(session_id.clone());
                return match self.sender.deliver(&outbound).await? {
                    Delivery::Session(used) if &used == session_id => Ok(Some(outbound)),
                    other => {
                        debug!("reply {} not return routed: {:?}", outbound.message.id(), other);
                        Ok(None)
                    }
                };
            }
        }

        let sender = self.sender.clone();
        tokio::spawn(async move {
            if let Err(e) = sender.send_message(&outbound).await {
                error!(
                    "failed to send {} to connection {}: {}",
                    outbound.message.message_type(),
                    outbound.connection.id,
                    e
                );
            }
        });
        Ok(None)
    }
}
