//! Peer relationships and their repository contract.
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    dids::DidCommService,
    messages::{generate_id, DidCommVersion},
    Error, Result,
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Initiated,
    Invited,
    Requested,
    Responded,
    Complete,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionRole {
    Initiator,
    Responder,
}

/// A keyed relationship between this agent and one peer.
///
/// `their_key` is write-once: [`ConnectionRecord::bind_their_key`] refuses to
/// replace a bound key with a different one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub id: String,
    pub state: ConnectionState,
    pub role: ConnectionRole,
    /// Our DID for this relationship.
    pub did: String,
    /// Our verkey for this relationship.
    pub verkey: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub their_did: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    their_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub their_label: Option<String>,
    /// Service of a peer without a resolvable DID document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub their_service: Option<DidCommService>,
    #[serde(default)]
    pub version: DidCommVersion,
    pub created_at: DateTime<Utc>,
}

impl ConnectionRecord {
    pub fn new(role: ConnectionRole, did: &str, verkey: &str) -> Self {
        ConnectionRecord {
            id: generate_id(),
            state: ConnectionState::Initiated,
            role,
            did: did.into(),
            verkey: verkey.into(),
            their_did: None,
            their_key: None,
            their_label: None,
            their_service: None,
            version: DidCommVersion::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_state(mut self, state: ConnectionState) -> Self {
        self.state = state;
        self
    }

    pub fn with_their_did(mut self, their_did: &str) -> Self {
        self.their_did = Some(their_did.into());
        self
    }

    pub fn with_their_service(mut self, service: DidCommService) -> Self {
        self.their_service = Some(service);
        self
    }

    pub fn with_version(mut self, version: DidCommVersion) -> Self {
        self.version = version;
        self
    }

    pub fn their_key(&self) -> Option<&str> {
        self.their_key.as_deref()
    }

    /// Binds the peer key. Rebinding the same key is a no-op, a different
    /// one is an authentication violation.
    pub fn bind_their_key(&mut self, key: &str) -> Result<()> {
        match &self.their_key {
            Some(bound) if bound != key => Err(Error::SenderNotAuthorized {
                sender: key.into(),
                connection_id: self.id.clone(),
            }),
            _ => {
                self.their_key = Some(key.into());
                Ok(())
            }
        }
    }

    pub fn with_their_key(mut self, key: &str) -> Result<Self> {
        self.bind_their_key(key)?;
        Ok(self)
    }

    /// Responded or complete.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, ConnectionState::Responded | ConnectionState::Complete)
    }

    pub fn assert_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(Error::ConnectionNotReady(self.id.clone()))
        }
    }
}

/// Relationship persistence, owned by the embedding application.
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<ConnectionRecord>>;
    /// Exact (our DID, their DID) pair.
    async fn find_by_dids(&self, our_did: &str, their_did: &str) -> Result<Option<ConnectionRecord>>;
    async fn find_by_our_did(&self, our_did: &str) -> Result<Option<ConnectionRecord>>;
    /// Relationship whose own verkey is `key`.
    async fn find_by_recipient_key(&self, key: &str) -> Result<Option<ConnectionRecord>>;
    /// Fails with `RecordDuplicate` if the id exists.
    async fn save(&self, record: ConnectionRecord) -> Result<()>;
    /// Fails with `RecordNotFound` if the id does not exist.
    async fn update(&self, record: ConnectionRecord) -> Result<()>;
}

/// [`ConnectionRepository`] over a locked map.
#[derive(Default)]
pub struct InMemoryConnectionRepository {
    records: RwLock<HashMap<String, ConnectionRecord>>,
}

impl InMemoryConnectionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn find_one<F>(&self, predicate: F) -> Option<ConnectionRecord>
    where
        F: Fn(&ConnectionRecord) -> bool,
    {
        self.records.read().await.values().find(|r| predicate(r)).cloned()
    }
}

#[async_trait]
impl ConnectionRepository for InMemoryConnectionRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<ConnectionRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn find_by_dids(&self, our_did: &str, their_did: &str) -> Result<Option<ConnectionRecord>> {
        Ok(self
            .find_one(|r| r.did == our_did && r.their_did.as_deref() == Some(their_did))
            .await)
    }

    async fn find_by_our_did(&self, our_did: &str) -> Result<Option<ConnectionRecord>> {
        Ok(self.find_one(|r| r.did == our_did).await)
    }

    async fn find_by_recipient_key(&self, key: &str) -> Result<Option<ConnectionRecord>> {
        Ok(self.find_one(|r| r.verkey == key).await)
    }

    async fn save(&self, record: ConnectionRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(Error::RecordDuplicate(record.id));
        }
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn update(&self, record: ConnectionRecord) -> Result<()> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.id) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(Error::RecordNotFound(record.id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn their_key_is_write_once() {
        let mut record = ConnectionRecord::new(ConnectionRole::Responder, "did:example:me", "MyKey");
        record.bind_their_key("K1").unwrap();
        record.bind_their_key("K1").unwrap();
        assert!(matches!(
            record.bind_their_key("K2"),
            Err(Error::SenderNotAuthorized { .. })
        ));
        assert_eq!(record.their_key(), Some("K1"));
    }

    #[test]
    fn readiness_follows_state() {
        let record = ConnectionRecord::new(ConnectionRole::Initiator, "did:example:me", "MyKey");
        assert!(!record.is_ready());
        assert!(record.assert_ready().is_err());
        assert!(record.clone().with_state(ConnectionState::Responded).is_ready());
        assert!(record.with_state(ConnectionState::Complete).is_ready());
    }

    #[tokio::test]
    async fn repository_lookups() {
        let repository = InMemoryConnectionRepository::new();
        let record = ConnectionRecord::new(ConnectionRole::Responder, "did:example:me", "MyKey")
            .with_their_did("did:example:them");
        repository.save(record.clone()).await.unwrap();
        assert!(matches!(
            repository.save(record.clone()).await,
            Err(Error::RecordDuplicate(_))
        ));

        assert_eq!(
            repository.find_by_dids("did:example:me", "did:example:them").await.unwrap(),
            Some(record.clone())
        );
        assert!(repository
            .find_by_dids("did:example:me", "did:example:other")
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            repository.find_by_recipient_key("MyKey").await.unwrap().map(|r| r.id),
            Some(record.id.clone())
        );

        let updated = record.with_state(ConnectionState::Complete);
        repository.update(updated.clone()).await.unwrap();
        assert_eq!(repository.find_by_id(&updated.id).await.unwrap(), Some(updated));
    }
}
