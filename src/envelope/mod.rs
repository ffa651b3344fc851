//! Version dispatching envelope service.
//!
//! Unpack reads only the protected header to pick the v1 or v2 adapter.
//! Pack takes the version from the outbound message itself.
use std::sync::Arc;

use crate::{
    crypto::{CryptoProvider, JoseProvider},
    dids::IdentityResolver,
    messages::{DidCommVersion, EncryptedMessage, PlaintextMessage, SignedMessage},
    routing::onion,
    Error, Result,
};

mod v1;
mod v2;

pub use v1::V1EnvelopeService;
pub use v2::{DidResolverAdapter, SecretsResolverAdapter, V2EnvelopeService};

/// Destination key material for one outbound pack.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnvelopeKeys {
    pub recipient_keys: Vec<String>,
    /// Relay hops, each wrapping the previous layer in listed order.
    pub routing_keys: Vec<String>,
    /// Absent for anonymous encryption.
    pub sender_key: Option<String>,
}

/// Plaintext recovered from an envelope, with the keys involved.
#[derive(Debug, Clone, PartialEq)]
pub struct DecryptedMessageContext {
    pub plaintext_message: PlaintextMessage,
    pub sender_key: Option<String>,
    pub recipient_key: Option<String>,
}

pub struct EnvelopeService {
    v1: V1EnvelopeService,
    v2: V2EnvelopeService,
    use_did_sov_prefix: bool,
}

impl EnvelopeService {
    pub fn new(
        crypto: Arc<dyn CryptoProvider>,
        jose: Arc<dyn JoseProvider>,
        identities: Arc<dyn IdentityResolver>,
    ) -> Self {
        EnvelopeService {
            v1: V1EnvelopeService::new(crypto.clone()),
            v2: V2EnvelopeService::new(jose, crypto, identities),
            use_did_sov_prefix: false,
        }
    }

    /// Emit forward messages with the legacy `did:sov` type prefix.
    pub fn with_did_sov_prefix(mut self, use_did_sov_prefix: bool) -> Self {
        self.use_did_sov_prefix = use_did_sov_prefix;
        self
    }

    /// Packs `message` for `keys`, onion wrapping once per routing key.
    pub async fn pack(&self, message: &PlaintextMessage, keys: &EnvelopeKeys) -> Result<EncryptedMessage> {
        let version = message.version()?;
        debug!(
            "packing {} message {} for {} recipient(s), {} hop(s)",
            version_label(version),
            message.id().unwrap_or_default(),
            keys.recipient_keys.len(),
            keys.routing_keys.len()
        );
        onion::wrap(self, version, &message.to_bytes()?, keys).await
    }

    /// Single layer of encryption with the adapter for `version`.
    pub async fn encrypt(
        &self,
        version: DidCommVersion,
        payload: &[u8],
        recipient_keys: &[String],
        sender_key: Option<&str>,
    ) -> Result<EncryptedMessage> {
        match version {
            DidCommVersion::V1 => self.v1.pack(payload, recipient_keys, sender_key).await,
            DidCommVersion::V2 => self.v2.pack(payload, recipient_keys, sender_key).await,
        }
    }

    pub async fn unpack(&self, envelope: &EncryptedMessage) -> Result<DecryptedMessageContext> {
        let version = envelope.protected_header()?.version()?;
        debug!("unpacking {} envelope", version_label(version));
        let result = match version {
            DidCommVersion::V1 => self.v1.unpack(envelope).await,
            DidCommVersion::V2 => self.v2.unpack(envelope).await,
        };
        if let Err(Error::DecryptionFailed) = &result {
            error!("unable to decrypt {} envelope", version_label(version));
        }
        result
    }

    /// Signs a v2 plaintext message with `signer_kid`.
    pub async fn pack_signed(&self, message: &PlaintextMessage, signer_kid: &str) -> Result<SignedMessage> {
        match message.version()? {
            DidCommVersion::V2 => self.v2.pack_signed(&message.to_bytes()?, signer_kid).await,
            DidCommVersion::V1 => Err(Error::UnsupportedVersion(
                "signed envelopes are v2 only".into(),
            )),
        }
    }

    pub async fn unpack_signed(&self, message: &SignedMessage) -> Result<DecryptedMessageContext> {
        debug!("verifying signed envelope");
        self.v2.unpack_signed(message).await
    }

    pub(crate) fn use_did_sov_prefix(&self) -> bool {
        self.use_did_sov_prefix
    }
}

fn version_label(version: DidCommVersion) -> &'static str {
    match version {
        DidCommVersion::V1 => "v1",
        DidCommVersion::V2 => "v2",
    }
}

#[cfg(all(test, feature = "raw-crypto"))]
mod tests {
    use super::*;
    use crate::{
        crypto::{JoseCrypto, LocalWallet},
        dids::DidRegistry,
        messages::{ProtectedHeader, BASIC_MESSAGE},
    };
    use serde_json::json;

    fn service(wallet: Arc<LocalWallet>) -> EnvelopeService {
        EnvelopeService::new(wallet, Arc::new(JoseCrypto::default()), Arc::new(DidRegistry::new()))
    }

    fn basic_message() -> PlaintextMessage {
        match json!({"@type": BASIC_MESSAGE, "@id": "m-1", "content": "hi", "sent_time": "2022-01-01T00:00:00Z"}) {
            serde_json::Value::Object(map) => PlaintextMessage::from_map(map),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn v1_round_trip() {
        let wallet = Arc::new(LocalWallet::new());
        let alice = wallet.create_key(Some([1; 32])).await.unwrap();
        let bob = wallet.create_key(Some([2; 32])).await.unwrap();
        let envelopes = service(wallet);

        let keys = EnvelopeKeys {
            recipient_keys: vec![bob.clone()],
            routing_keys: vec![],
            sender_key: Some(alice.clone()),
        };
        let packed = envelopes.pack(&basic_message(), &keys).await.unwrap();
        let unpacked = envelopes.unpack(&packed).await.unwrap();
        assert_eq!(unpacked.plaintext_message, basic_message());
        assert_eq!(unpacked.sender_key, Some(alice));
        assert_eq!(unpacked.recipient_key, Some(bob));
    }

    #[tokio::test]
    async fn unknown_envelope_tags_are_unsupported() {
        let envelopes = service(Arc::new(LocalWallet::new()));
        let protected = ProtectedHeader {
            alg: Some("RSA-OAEP".into()),
            typ: Some("JWM/1.0".into()),
            ..Default::default()
        }
        .encode()
        .unwrap();
        let envelope = EncryptedMessage {
            protected,
            recipients: vec![],
            iv: "aXY".into(),
            ciphertext: "Y3Q".into(),
            tag: "dGFn".into(),
        };
        assert!(matches!(
            envelopes.unpack(&envelope).await,
            Err(Error::UnsupportedVersion(_))
        ));
    }

    #[tokio::test]
    async fn malformed_protected_header_fails_fast() {
        let envelopes = service(Arc::new(LocalWallet::new()));
        let envelope = EncryptedMessage {
            protected: "not base64 json!".into(),
            recipients: vec![],
            iv: "aXY".into(),
            ciphertext: "Y3Q".into(),
            tag: "dGFn".into(),
        };
        assert!(matches!(
            envelopes.unpack(&envelope).await,
            Err(Error::MalformedEnvelope(_))
        ));
    }

    #[tokio::test]
    async fn signing_requires_v2_message() {
        let envelopes = service(Arc::new(LocalWallet::new()));
        assert!(matches!(
            envelopes.pack_signed(&basic_message(), "did:example:alice#key-1").await,
            Err(Error::UnsupportedVersion(_))
        ));
    }
}
