use std::sync::Arc;

use super::DecryptedMessageContext;
use crate::{
    crypto::CryptoProvider,
    messages::{EncryptedMessage, PlaintextMessage},
    Result,
};

/// Legacy authcrypt/anoncrypt envelopes, delegated to the wallet.
///
/// Keys are raw base58 verkeys.
pub struct V1EnvelopeService {
    crypto: Arc<dyn CryptoProvider>,
}

impl V1EnvelopeService {
    pub fn new(crypto: Arc<dyn CryptoProvider>) -> Self {
        V1EnvelopeService { crypto }
    }

    pub async fn pack(
        &self,
        payload: &[u8],
        recipient_keys: &[String],
        sender_key: Option<&str>,
    ) -> Result<EncryptedMessage> {
        self.crypto.pack(payload, recipient_keys, sender_key).await
    }

    pub async fn unpack(&self, envelope: &EncryptedMessage) -> Result<DecryptedMessageContext> {
        let unpacked = self.crypto.unpack(envelope).await?;
        Ok(DecryptedMessageContext {
            plaintext_message: PlaintextMessage::from_bytes(&unpacked.plaintext)?,
            sender_key: unpacked.sender_key,
            recipient_key: Some(unpacked.recipient_key),
        })
    }
}
