use super::{
    agent_message::generate_id,
    decorators::{Decorators, Thread},
    envelope::EncryptedMessage,
    forward::AttachmentData,
};
use crate::{Error, Result};

pub const STATUS_REQUEST: &str = "https://didcomm.org/messagepickup/2.0/status-request";
pub const STATUS: &str = "https://didcomm.org/messagepickup/2.0/status";
pub const DELIVERY_REQUEST: &str = "https://didcomm.org/messagepickup/2.0/delivery-request";
pub const MESSAGE_DELIVERY: &str = "https://didcomm.org/messagepickup/2.0/delivery";
pub const MESSAGES_RECEIVED: &str = "https://didcomm.org/messagepickup/2.0/messages-received";

/// `messagepickup/2.0/status-request`, Aries RFC 0685.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusRequest {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_key: Option<String>,
    #[serde(flatten)]
    pub decorators: Decorators,
}

impl StatusRequest {
    pub fn new(recipient_key: Option<&str>) -> Self {
        StatusRequest {
            id: generate_id(),
            recipient_key: recipient_key.map(String::from),
            decorators: Decorators::default(),
        }
    }
}

crate::didcomm_message!(StatusRequest, STATUS_REQUEST, legacy_prefix);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Status {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_key: Option<String>,
    pub message_count: usize,
    #[serde(flatten)]
    pub decorators: Decorators,
}

impl Status {
    pub fn new(thid: &str, recipient_key: Option<String>, message_count: usize) -> Self {
        Status {
            id: generate_id(),
            recipient_key,
            message_count,
            decorators: Decorators::default().with_thread(Thread::implicit_reply(thid)),
        }
    }
}

crate::didcomm_message!(Status, STATUS, legacy_prefix);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeliveryRequest {
    #[serde(rename = "@id")]
    pub id: String,
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_key: Option<String>,
    #[serde(flatten)]
    pub decorators: Decorators,
}

impl DeliveryRequest {
    pub fn new(limit: usize, recipient_key: Option<&str>) -> Self {
        DeliveryRequest {
            id: generate_id(),
            limit,
            recipient_key: recipient_key.map(String::from),
            decorators: Decorators::default(),
        }
    }

    fn check(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(Error::MessageValidation {
                message_type: DELIVERY_REQUEST.into(),
                reason: "limit must be positive".into(),
            });
        }
        Ok(())
    }
}

crate::didcomm_message!(DeliveryRequest, DELIVERY_REQUEST, legacy_prefix, validate = DeliveryRequest::check);

/// Queued envelope attached to a delivery, `@id` is its queue id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeliveredMessage {
    #[serde(rename = "@id")]
    pub id: String,
    pub data: AttachmentData,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessageDelivery {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_key: Option<String>,
    #[serde(rename = "~attach")]
    pub attachments: Vec<DeliveredMessage>,
    #[serde(flatten)]
    pub decorators: Decorators,
}

impl MessageDelivery {
    pub fn new(thid: &str, recipient_key: Option<String>, messages: Vec<(String, EncryptedMessage)>) -> Result<Self> {
        let attachments = messages
            .into_iter()
            .map(|(id, envelope)| -> Result<DeliveredMessage> {
                Ok(DeliveredMessage {
                    id,
                    data: AttachmentData {
                        json: Some(serde_json::to_value(envelope)?),
                        base64: None,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MessageDelivery {
            id: generate_id(),
            recipient_key,
            attachments,
            decorators: Decorators::default().with_thread(Thread::implicit_reply(thid)),
        })
    }

    /// Queue ids and envelopes of the attached messages.
    pub fn messages(&self) -> Result<Vec<(String, EncryptedMessage)>> {
        self.attachments
            .iter()
            .map(|attachment| -> Result<(String, EncryptedMessage)> {
                let json = attachment
                    .data
                    .json
                    .clone()
                    .ok_or_else(|| Error::MalformedMessage(format!("attachment {} is not JSON", attachment.id)))?;
                let envelope =
                    serde_json::from_value(json).map_err(|e| Error::MalformedEnvelope(e.to_string()))?;
                Ok((attachment.id.clone(), envelope))
            })
            .collect()
    }

    fn check(&self) -> Result<()> {
        if self.attachments.is_empty() {
            return Err(Error::MessageValidation {
                message_type: MESSAGE_DELIVERY.into(),
                reason: "delivery without attachments".into(),
            });
        }
        Ok(())
    }
}

crate::didcomm_message!(MessageDelivery, MESSAGE_DELIVERY, legacy_prefix, validate = MessageDelivery::check);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessagesReceived {
    #[serde(rename = "@id")]
    pub id: String,
    pub message_id_list: Vec<String>,
    #[serde(flatten)]
    pub decorators: Decorators,
}

impl MessagesReceived {
    pub fn new(message_id_list: Vec<String>) -> Self {
        MessagesReceived {
            id: generate_id(),
            message_id_list,
            decorators: Decorators::default(),
        }
    }
}

crate::didcomm_message!(MessagesReceived, MESSAGES_RECEIVED, legacy_prefix);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delivery_attaches_envelopes_by_queue_id() {
        let envelope = EncryptedMessage {
            protected: "cHJvdGVjdGVk".into(),
            recipients: vec![],
            iv: "aXY".into(),
            ciphertext: "Y3Q".into(),
            tag: "dGFn".into(),
        };
        let delivery = MessageDelivery::new("req-1", None, vec![("q-1".into(), envelope.clone())]).unwrap();

        let json = serde_json::to_value(&delivery).unwrap();
        assert_eq!(json["~attach"][0]["@id"], "q-1");
        assert_eq!(json["~attach"][0]["data"]["json"]["tag"], "dGFn");
        assert_eq!(json["~thread"]["thid"], "req-1");
        assert_eq!(delivery.messages().unwrap(), vec![("q-1".to_string(), envelope)]);
    }

    #[test]
    fn zero_limit_is_rejected() {
        let request: DeliveryRequest = serde_json::from_value(json!({
            "@type": DELIVERY_REQUEST,
            "@id": "d-1",
            "limit": 0
        }))
        .unwrap();
        assert!(matches!(request.check(), Err(Error::MessageValidation { .. })));
    }
}
