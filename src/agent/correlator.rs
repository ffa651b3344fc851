use std::sync::Arc;

use crate::{
    connections::{ConnectionRecord, ConnectionRepository},
    dids::IdentityResolver,
    Error, Result,
};

/// Finds the relationship an authenticated inbound message belongs to.
///
/// Read only: it never binds keys or creates records.
pub struct ConnectionCorrelator {
    identities: Arc<dyn IdentityResolver>,
    connections: Arc<dyn ConnectionRepository>,
}

impl ConnectionCorrelator {
    pub fn new(identities: Arc<dyn IdentityResolver>, connections: Arc<dyn ConnectionRepository>) -> Self {
        ConnectionCorrelator {
            identities,
            connections,
        }
    }

    /// `None` means first contact. A sender that conflicts with an
    /// established relationship is `SenderNotAuthorized`.
    pub async fn correlate(&self, sender_key: &str, recipient_key: &str) -> Result<Option<ConnectionRecord>> {
        let sender_did = self.identities.find_their_did(sender_key).await?;
        if let Some(our_did) = self.identities.find_our_did(recipient_key).await? {
            match &sender_did {
                Some(their_did) => {
                    if let Some(connection) = self.connections.find_by_dids(&our_did, their_did).await? {
                        check_their_key(&connection, sender_key)?;
                        return Ok(Some(connection));
                    }
                }
                None => {
                    if let Some(connection) = self.connections.find_by_our_did(&our_did).await? {
                        if connection.their_did.is_some() {
                            warn!(
                                "unknown sender {} for established connection {}",
                                sender_key, connection.id
                            );
                            return Err(unauthorized(&connection, sender_key));
                        }
                        check_their_key(&connection, sender_key)?;
                        return Ok(Some(connection));
                    }
                }
            }
        }

        match self.connections.find_by_recipient_key(recipient_key).await? {
            Some(connection) => {
                check_their_did(&connection, sender_did.as_deref(), sender_key)?;
                check_their_key(&connection, sender_key)?;
                Ok(Some(connection))
            }
            None => Ok(None),
        }
    }
}

/// A relationship bound to a peer DID only accepts senders resolving to it.
fn check_their_did(connection: &ConnectionRecord, sender_did: Option<&str>, sender_key: &str) -> Result<()> {
    match connection.their_did.as_deref() {
        Some(bound) if sender_did != Some(bound) => {
            warn!(
                "sender {} resolves to {}, connection {} belongs to {}",
                sender_key,
                sender_did.unwrap_or("<unknown>"),
                connection.id,
                bound
            );
            Err(unauthorized(connection, sender_key))
        }
        _ => Ok(()),
    }
}

fn check_their_key(connection: &ConnectionRecord, sender_key: &str) -> Result<()> {
    match connection.their_key() {
        Some(bound) if bound != sender_key => {
            warn!(
                "sender key {} conflicts with connection {}",
                sender_key, connection.id
            );
            Err(unauthorized(connection, sender_key))
        }
        _ => Ok(()),
    }
}

fn unauthorized(connection: &ConnectionRecord, sender_key: &str) -> Error {
    Error::SenderNotAuthorized {
        sender: sender_key.into(),
        connection_id: connection.id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use quickcheck_macros::quickcheck;

    use super::*;
    use crate::{
        connections::{ConnectionRole, ConnectionState, InMemoryConnectionRepository},
        dids::{DidCommService, DidDocument, DidRegistry},
    };

    fn document(did: &str, key: &str) -> DidDocument {
        let mut document = DidDocument::new(did);
        document.service = vec![DidCommService::new(
            &format!("{}#didcomm", did),
            "https://example.com",
            vec![key.into()],
            vec![],
        )];
        document
    }

    async fn correlator(
        records: Vec<ConnectionRecord>,
    ) -> ConnectionCorrelator {
        let registry = DidRegistry::new();
        registry.register_ours(document("did:example:me", "MyKey")).await;
        registry.register_theirs(document("did:example:peer", "PeerKey")).await;
        let repository = InMemoryConnectionRepository::new();
        for record in records {
            repository.save(record).await.unwrap();
        }
        ConnectionCorrelator::new(Arc::new(registry), Arc::new(repository))
    }

    fn established() -> ConnectionRecord {
        ConnectionRecord::new(ConnectionRole::Responder, "did:example:me", "MyKey")
            .with_their_did("did:example:peer")
            .with_state(ConnectionState::Complete)
    }

    #[tokio::test]
    async fn matches_by_did_pair() {
        let record = established();
        let correlator = correlator(vec![record.clone()]).await;
        let found = correlator.correlate("PeerKey", "MyKey").await.unwrap();
        assert_eq!(found.map(|c| c.id), Some(record.id));
    }

    #[tokio::test]
    async fn unknown_sender_on_established_connection_is_rejected() {
        let correlator = correlator(vec![established()]).await;
        assert!(matches!(
            correlator.correlate("IntruderKey", "MyKey").await,
            Err(Error::SenderNotAuthorized { .. })
        ));
    }

    #[tokio::test]
    async fn known_third_party_cannot_join_established_connection() {
        let registry = DidRegistry::new();
        registry.register_ours(document("did:example:me", "MyKey")).await;
        registry.register_theirs(document("did:example:peer", "PeerKey")).await;
        registry.register_theirs(document("did:example:mallory", "MalloryKey")).await;
        let repository = InMemoryConnectionRepository::new();
        repository.save(established()).await.unwrap();
        let correlator = ConnectionCorrelator::new(Arc::new(registry), Arc::new(repository));

        assert!(matches!(
            correlator.correlate("MalloryKey", "MyKey").await,
            Err(Error::SenderNotAuthorized { .. })
        ));
        assert!(correlator.correlate("PeerKey", "MyKey").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn raw_key_fallback_checks_peer_did() {
        let legacy = ConnectionRecord::new(ConnectionRole::Responder, "did:sov:legacy", "LegacyKey")
            .with_their_did("did:example:peer");
        let correlator = correlator(vec![legacy.clone()]).await;
        assert_eq!(
            correlator.correlate("PeerKey", "LegacyKey").await.unwrap().map(|c| c.id),
            Some(legacy.id)
        );
        assert!(matches!(
            correlator.correlate("StrangerKey", "LegacyKey").await,
            Err(Error::SenderNotAuthorized { .. })
        ));
    }

    #[tokio::test]
    async fn pending_connection_accepts_first_sender() {
        let pending = ConnectionRecord::new(ConnectionRole::Initiator, "did:example:me", "MyKey");
        let correlator = correlator(vec![pending.clone()]).await;
        let found = correlator.correlate("AnyKey", "MyKey").await.unwrap();
        assert_eq!(found.map(|c| c.id), Some(pending.id));
    }

    #[tokio::test]
    async fn raw_key_fallback_and_first_contact() {
        let legacy = ConnectionRecord::new(ConnectionRole::Responder, "did:sov:legacy", "LegacyKey")
            .with_their_key("PeerLegacyKey")
            .unwrap();
        let correlator = correlator(vec![legacy.clone()]).await;
        assert_eq!(
            correlator.correlate("PeerLegacyKey", "LegacyKey").await.unwrap().map(|c| c.id),
            Some(legacy.id)
        );
        assert!(matches!(
            correlator.correlate("OtherKey", "LegacyKey").await,
            Err(Error::SenderNotAuthorized { .. })
        ));
        assert!(correlator.correlate("PeerKey", "UnknownKey").await.unwrap().is_none());
    }

    #[quickcheck]
    fn bound_key_rejects_every_other_sender(bound: String, observed: String) -> bool {
        if bound == observed {
            return true;
        }
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let record = ConnectionRecord::new(ConnectionRole::Responder, "did:sov:raw", "RawKey")
                .with_their_key(&bound)
                .unwrap();
            let correlator = correlator(vec![record]).await;
            matches!(
                correlator.correlate(&observed, "RawKey").await,
                Err(Error::SenderNotAuthorized { .. })
            )
        })
    }
}
