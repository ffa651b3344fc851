use crate::{
    connections::ConnectionRecord,
    messages::{AgentMessage, DidCommVersion},
    Error, Result,
};

/// Everything a handler knows about one inbound message.
#[derive(Debug, Clone)]
pub struct InboundMessageContext {
    pub message: AgentMessage,
    /// Correlated relationship, only when ready.
    pub connection: Option<ConnectionRecord>,
    /// Live transport session saved for return routing.
    pub session_id: Option<String>,
    pub sender_key: Option<String>,
    pub recipient_key: Option<String>,
    pub version: DidCommVersion,
}

impl InboundMessageContext {
    pub fn new(message: AgentMessage, version: DidCommVersion) -> Self {
        InboundMessageContext {
            message,
            connection: None,
            session_id: None,
            sender_key: None,
            recipient_key: None,
            version,
        }
    }

    pub fn assert_ready_connection(&self) -> Result<&ConnectionRecord> {
        let connection = self.connection.as_ref().ok_or_else(|| {
            Error::ConnectionNotReady(format!(
                "no connection for message {} ({})",
                self.message.id(),
                self.message.message_type()
            ))
        })?;
        connection.assert_ready()?;
        Ok(connection)
    }
}

/// A message to deliver to a relationship.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub message: AgentMessage,
    pub connection: ConnectionRecord,
    /// Set when the reply goes back over the inbound session.
    pub session_id: Option<String>,
    pub version: DidCommVersion,
}

impl OutboundMessage {
    /// Uses the relationship's version.
    pub fn new(message: AgentMessage, connection: ConnectionRecord) -> Self {
        let version = connection.version;
        OutboundMessage {
            message,
            connection,
            session_id: None,
            version,
        }
    }

    /// Reply to `context`, in the inbound version, to its ready relationship.
    pub fn reply(message: AgentMessage, context: &InboundMessageContext) -> Result<Self> {
        Ok(OutboundMessage {
            message,
            connection: context.assert_ready_connection()?.clone(),
            session_id: context.session_id.clone(),
            version: context.version,
        })
    }

    pub fn with_version(mut self, version: DidCommVersion) -> Self {
        self.version = version;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        connections::{ConnectionRole, ConnectionState},
        messages::BasicMessage,
    };

    #[test]
    fn replies_require_a_ready_connection() {
        let message = AgentMessage::new(BasicMessage::new("hi")).unwrap();
        let mut context = InboundMessageContext::new(message.clone(), DidCommVersion::V2);
        assert!(OutboundMessage::reply(message.clone(), &context).is_err());

        let connection = ConnectionRecord::new(ConnectionRole::Responder, "did:example:me", "Key");
        context.connection = Some(connection.clone());
        assert!(matches!(
            OutboundMessage::reply(message.clone(), &context),
            Err(Error::ConnectionNotReady(_))
        ));

        context.connection = Some(connection.with_state(ConnectionState::Complete));
        context.session_id = Some("s-1".into());
        let reply = OutboundMessage::reply(message, &context).unwrap();
        assert_eq!(reply.version, DidCommVersion::V2);
        assert_eq!(reply.session_id.as_deref(), Some("s-1"));
    }
}
