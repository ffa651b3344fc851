use std::sync::Arc;

use serde_json::Value;

use super::dispatcher::HandlerRegistry;
use crate::{
    messages::{AgentMessage, DidCommVersion, PlaintextMessage},
    Error, Result,
};

/// Turns plaintext into a typed message using the handler registry.
pub struct MessageResolver {
    registry: Arc<HandlerRegistry>,
}

impl MessageResolver {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        MessageResolver { registry }
    }

    /// `NoHandler` for unregistered types, `MessageValidation` for payloads
    /// that do not fit the registered schema.
    pub fn resolve(&self, plaintext: PlaintextMessage) -> Result<(DidCommVersion, AgentMessage)> {
        let (version, canonical) = plaintext.into_canonical()?;
        let message_type = match canonical.get("@type") {
            Some(Value::String(message_type)) => message_type.clone(),
            _ => return Err(Error::MalformedMessage("message type is not a string".into())),
        };
        let registration = self
            .registry
            .find(&message_type)
            .ok_or(Error::NoHandler(message_type))?;
        let message = (registration.parse)(canonical)?;
        Ok((version, message))
    }
}
