//! Onion wrapping for relayed delivery.
//!
//! The message is encrypted once, sender authenticated, to the final
//! recipient. Each routing key then wraps the previous layer in a forward
//! message addressed to the previous layer's recipient and encrypts that
//! anonymously to itself. Relays therefore only ever see a forward
//! envelope and never learn the original sender.
use std::{convert::TryFrom, slice};

use crate::{
    envelope::{EnvelopeKeys, EnvelopeService},
    messages::{
        AgentMessage, DidCommVersion, EncryptedMessage, ForwardEnvelope, ForwardMessage,
        ForwardMessageV2,
    },
    Error, Result,
};

pub async fn wrap(
    envelopes: &EnvelopeService,
    version: DidCommVersion,
    payload: &[u8],
    keys: &EnvelopeKeys,
) -> Result<EncryptedMessage> {
    let mut to = keys
        .recipient_keys
        .first()
        .cloned()
        .ok_or_else(|| Error::Generic("cannot pack without recipient keys".into()))?;
    let mut envelope = envelopes
        .encrypt(version, payload, &keys.recipient_keys, keys.sender_key.as_deref())
        .await?;

    for routing_key in &keys.routing_keys {
        let forward = ForwardEnvelope {
            to,
            message: envelope,
        }
        .into_message(version)?
        .to_plaintext(version, envelopes.use_did_sov_prefix())
        .to_bytes()?;
        debug!("wrapping forward layer for routing key {}", routing_key);
        envelope = envelopes
            .encrypt(version, &forward, slice::from_ref(routing_key), None)
            .await?;
        to = routing_key.clone();
    }
    Ok(envelope)
}

/// The forward envelope carried by a resolved forward message of either
/// version, if it is one.
pub fn unwrap_forward(message: &AgentMessage) -> Result<Option<ForwardEnvelope>> {
    if let Some(forward) = message.downcast_ref::<ForwardMessage>() {
        return Ok(Some(forward.clone().into()));
    }
    if let Some(forward) = message.downcast_ref::<ForwardMessageV2>() {
        return ForwardEnvelope::try_from(forward.clone()).map(Some);
    }
    Ok(None)
}

#[cfg(all(test, feature = "raw-crypto"))]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        crypto::{JoseCrypto, LocalWallet},
        dids::DidRegistry,
        messages::{PlaintextMessage, FORWARD},
    };

    async fn setup() -> (EnvelopeService, Vec<String>) {
        let wallet = Arc::new(LocalWallet::new());
        let mut keys = vec![];
        for seed in 1..=4u8 {
            keys.push(wallet.create_key(Some([seed; 32])).await.unwrap());
        }
        let envelopes =
            EnvelopeService::new(wallet, Arc::new(JoseCrypto::default()), Arc::new(DidRegistry::new()));
        (envelopes, keys)
    }

    #[tokio::test]
    async fn zero_routing_keys_is_a_single_layer() {
        let (envelopes, keys) = setup().await;
        let destination = EnvelopeKeys {
            recipient_keys: vec![keys[1].clone()],
            routing_keys: vec![],
            sender_key: Some(keys[0].clone()),
        };
        let packed = wrap(&envelopes, DidCommVersion::V1, b"{\"@type\":\"x\"}", &destination)
            .await
            .unwrap();
        let unpacked = envelopes.unpack(&packed).await.unwrap();
        assert_eq!(unpacked.recipient_key.as_deref(), Some(keys[1].as_str()));
        assert_eq!(unpacked.sender_key.as_deref(), Some(keys[0].as_str()));
    }

    #[tokio::test]
    async fn each_layer_is_anonymous_and_addressed_to_the_previous_hop() {
        let (envelopes, keys) = setup().await;
        let destination = EnvelopeKeys {
            recipient_keys: vec![keys[1].clone()],
            routing_keys: vec![keys[2].clone(), keys[3].clone()],
            sender_key: Some(keys[0].clone()),
        };
        let packed = wrap(&envelopes, DidCommVersion::V1, b"{\"@type\":\"x\"}", &destination)
            .await
            .unwrap();

        let outer = envelopes.unpack(&packed).await.unwrap();
        assert_eq!(outer.recipient_key.as_deref(), Some(keys[3].as_str()));
        assert!(outer.sender_key.is_none());
        let forward = outer.plaintext_message;
        assert_eq!(forward.message_type(), Some(FORWARD));
        assert_eq!(forward.as_map()["to"], keys[2].as_str());

        let inner_envelope: EncryptedMessage =
            serde_json::from_value(forward.as_map()["msg"].clone()).unwrap();
        let middle = envelopes.unpack(&inner_envelope).await.unwrap();
        assert_eq!(middle.plaintext_message.as_map()["to"], keys[1].as_str());
        assert!(middle.sender_key.is_none());

        let innermost: EncryptedMessage =
            serde_json::from_value(middle.plaintext_message.as_map()["msg"].clone()).unwrap();
        let final_layer = envelopes.unpack(&innermost).await.unwrap();
        assert_eq!(final_layer.sender_key.as_deref(), Some(keys[0].as_str()));
        assert_eq!(
            final_layer.plaintext_message,
            PlaintextMessage::from_bytes(b"{\"@type\":\"x\"}").unwrap()
        );
    }
}
