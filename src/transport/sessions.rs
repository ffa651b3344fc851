use std::{collections::HashMap, fmt, sync::Arc};

use tokio::sync::RwLock;

use super::TransportSession;
use crate::{connections::ConnectionRecord, envelope::EnvelopeKeys, messages::AgentMessage};

/// A live session kept for return routed replies.
#[derive(Clone)]
pub struct SessionRecord {
    pub session: Arc<dyn TransportSession>,
    /// Keys replies over this session are packed with.
    pub keys: EnvelopeKeys,
    /// The message that opened the session.
    pub inbound_message: AgentMessage,
    pub connection: Option<ConnectionRecord>,
}

impl SessionRecord {
    pub fn id(&self) -> &str {
        self.session.id()
    }
}

impl fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("id", &self.session.id())
            .field("kind", &self.session.kind())
            .field("keys", &self.keys)
            .field("inbound_message", &self.inbound_message)
            .field("connection", &self.connection.as_ref().map(|c| &c.id))
            .finish()
    }
}

/// In-memory sessions keyed by transport session id.
///
/// No expiry: transports remove their sessions when they close.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves or replaces the session with the same id.
    pub async fn save(&self, record: SessionRecord) {
        debug!("saving {} session {}", record.session.kind(), record.id());
        self.sessions
            .write()
            .await
            .insert(record.id().to_string(), record);
    }

    pub async fn find(&self, id: &str) -> Option<SessionRecord> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn find_by_connection_id(&self, connection_id: &str) -> Option<SessionRecord> {
        self.sessions
            .read()
            .await
            .values()
            .find(|s| s.connection.as_ref().map(|c| c.id.as_str()) == Some(connection_id))
            .cloned()
    }

    pub async fn remove(&self, id: &str) -> Option<SessionRecord> {
        let removed = self.sessions.write().await.remove(id);
        if removed.is_some() {
            debug!("removed session {}", id);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{
        connections::{ConnectionRole, ConnectionState},
        messages::BasicMessage,
        transport::OutboundPackage,
        Result,
    };

    struct NullSession(String);

    #[async_trait]
    impl TransportSession for NullSession {
        fn id(&self) -> &str {
            &self.0
        }

        fn kind(&self) -> &str {
            "null"
        }

        async fn send(&self, _: OutboundPackage) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn record(id: &str, connection: Option<ConnectionRecord>) -> SessionRecord {
        SessionRecord {
            session: Arc::new(NullSession(id.into())),
            keys: EnvelopeKeys::default(),
            inbound_message: AgentMessage::new(BasicMessage::new("hi")).unwrap(),
            connection,
        }
    }

    #[tokio::test]
    async fn sessions_are_found_by_id_and_connection() {
        let registry = SessionRegistry::new();
        let connection = ConnectionRecord::new(ConnectionRole::Responder, "did:example:me", "Key")
            .with_state(ConnectionState::Complete);
        registry.save(record("s-1", None)).await;
        registry.save(record("s-2", Some(connection.clone()))).await;

        assert_eq!(registry.len().await, 2);
        assert!(registry.find("s-1").await.is_some());
        assert_eq!(
            registry.find_by_connection_id(&connection.id).await.map(|s| s.id().to_string()),
            Some("s-2".to_string())
        );

        assert!(registry.remove("s-2").await.is_some());
        assert!(registry.remove("s-2").await.is_none());
        assert!(registry.find_by_connection_id(&connection.id).await.is_none());
    }
}
