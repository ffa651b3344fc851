use std::sync::Arc;

use async_trait::async_trait;

use super::DecryptedMessageContext;
use crate::{
    crypto::{CryptoProvider, DidResolver, JoseProvider, Secret, SecretsResolver},
    dids::{DidDocument, IdentityResolver},
    messages::{EncryptedMessage, PlaintextMessage, SignedMessage},
    Error, Result,
};

/// Bridges the identity resolver onto what the JOSE provider expects.
pub struct DidResolverAdapter<'a>(pub &'a dyn IdentityResolver);

#[async_trait]
impl<'a> DidResolver for DidResolverAdapter<'a> {
    async fn resolve(&self, did: &str) -> Result<Option<DidDocument>> {
        self.0.resolve_did(did).await
    }
}

/// Bridges the wallet's key custody onto what the JOSE provider expects.
pub struct SecretsResolverAdapter<'a>(pub &'a dyn CryptoProvider);

#[async_trait]
impl<'a> SecretsResolver for SecretsResolverAdapter<'a> {
    async fn get_secret(&self, kid: &str) -> Result<Option<Secret>> {
        self.0.retrieve_secret(kid).await
    }

    async fn find_secret(&self, kids: &[String]) -> Result<Option<String>> {
        for kid in kids {
            if self.0.retrieve_secret(kid).await?.is_some() {
                return Ok(Some(kid.clone()));
            }
        }
        Ok(None)
    }
}

/// JOSE envelopes. Keys are DID URL key identifiers.
pub struct V2EnvelopeService {
    jose: Arc<dyn JoseProvider>,
    crypto: Arc<dyn CryptoProvider>,
    identities: Arc<dyn IdentityResolver>,
}

impl V2EnvelopeService {
    pub fn new(
        jose: Arc<dyn JoseProvider>,
        crypto: Arc<dyn CryptoProvider>,
        identities: Arc<dyn IdentityResolver>,
    ) -> Self {
        V2EnvelopeService {
            jose,
            crypto,
            identities,
        }
    }

    pub async fn pack(
        &self,
        payload: &[u8],
        recipient_keys: &[String],
        sender_key: Option<&str>,
    ) -> Result<EncryptedMessage> {
        let dids = DidResolverAdapter(self.identities.as_ref());
        let secrets = SecretsResolverAdapter(self.crypto.as_ref());
        self.jose
            .encrypt(payload, recipient_keys, sender_key, &dids, &secrets)
            .await
    }

    /// Decrypts with the first recipient key id, in envelope order, that
    /// this agent holds a secret for.
    pub async fn unpack(&self, envelope: &EncryptedMessage) -> Result<DecryptedMessageContext> {
        let dids = DidResolverAdapter(self.identities.as_ref());
        let secrets = SecretsResolverAdapter(self.crypto.as_ref());
        let candidates = envelope.recipient_kids()?;
        let recipient_kid = secrets.find_secret(&candidates).await?.ok_or_else(|| {
            debug!("none of {} recipient key ids is held locally", candidates.len());
            Error::DecryptionFailed
        })?;
        let decrypted = self
            .jose
            .decrypt(envelope, &recipient_kid, &dids, &secrets)
            .await?;
        Ok(DecryptedMessageContext {
            plaintext_message: PlaintextMessage::from_bytes(&decrypted.plaintext)?,
            sender_key: decrypted.sender_kid,
            recipient_key: Some(recipient_kid),
        })
    }

    pub async fn pack_signed(&self, payload: &[u8], signer_kid: &str) -> Result<SignedMessage> {
        let secrets = SecretsResolverAdapter(self.crypto.as_ref());
        self.jose.sign(payload, signer_kid, &secrets).await
    }

    pub async fn unpack_signed(&self, message: &SignedMessage) -> Result<DecryptedMessageContext> {
        let dids = DidResolverAdapter(self.identities.as_ref());
        let (payload, signer_kid) = self.jose.verify(message, &dids).await?;
        Ok(DecryptedMessageContext {
            plaintext_message: PlaintextMessage::from_bytes(&payload)?,
            sender_key: Some(signer_kid),
            recipient_key: None,
        })
    }
}

#[cfg(all(test, feature = "raw-crypto"))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::crypto::{LocalWallet, UnpackedMessage};

    struct CountingLookups {
        wallet: LocalWallet,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl CryptoProvider for CountingLookups {
        async fn sign(&self, data: &[u8], verkey: &str) -> Result<Vec<u8>> {
            self.wallet.sign(data, verkey).await
        }

        async fn verify(&self, data: &[u8], signature: &[u8], verkey: &str) -> Result<bool> {
            self.wallet.verify(data, signature, verkey).await
        }

        async fn pack(
            &self,
            payload: &[u8],
            recipient_keys: &[String],
            sender_key: Option<&str>,
        ) -> Result<EncryptedMessage> {
            self.wallet.pack(payload, recipient_keys, sender_key).await
        }

        async fn unpack(&self, envelope: &EncryptedMessage) -> Result<UnpackedMessage> {
            self.wallet.unpack(envelope).await
        }

        async fn retrieve_secret(&self, kid: &str) -> Result<Option<Secret>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.wallet.retrieve_secret(kid).await
        }
    }

    #[tokio::test]
    async fn secret_lookup_stops_at_first_held_kid() {
        let provider = CountingLookups {
            wallet: LocalWallet::new(),
            lookups: AtomicUsize::new(0),
        };
        provider
            .wallet
            .import_secret(Secret::x25519("did:example:bob#key-1", [1; 32]))
            .await;
        provider
            .wallet
            .import_secret(Secret::x25519("did:example:bob#key-2", [2; 32]))
            .await;
        let kids = vec![
            "did:example:carol#key-1".to_string(),
            "did:example:bob#key-1".to_string(),
            "did:example:bob#key-2".to_string(),
        ];

        let found = SecretsResolverAdapter(&provider).find_secret(&kids).await.unwrap();

        assert_eq!(found.as_deref(), Some("did:example:bob#key-1"));
        assert_eq!(provider.lookups.load(Ordering::SeqCst), 2);
    }
}
