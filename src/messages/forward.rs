use super::{
    agent_message::{generate_id, AgentMessage},
    decorators::Decorators,
    envelope::EncryptedMessage,
    plaintext::DidCommVersion,
};
use crate::{Error, Result};

pub const FORWARD: &str = "https://didcomm.org/routing/1.0/forward";
pub const FORWARD_V2: &str = "https://didcomm.org/routing/2.0/forward";

/// One hop of an onion: an opaque envelope and the key it is addressed to.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardEnvelope {
    pub to: String,
    pub message: EncryptedMessage,
}

impl ForwardEnvelope {
    /// Forward message wrapping this envelope, in the shape of `version`.
    pub fn into_message(self, version: DidCommVersion) -> Result<AgentMessage> {
        match version {
            DidCommVersion::V1 => AgentMessage::new(ForwardMessage {
                id: generate_id(),
                to: self.to,
                msg: self.message,
                decorators: Decorators::default(),
            }),
            DidCommVersion::V2 => AgentMessage::new(ForwardMessageV2 {
                id: generate_id(),
                next: self.to,
                attachments: vec![Attachment::json(serde_json::to_value(self.message)?)],
                decorators: Decorators::default(),
            }),
        }
    }
}

/// `routing/1.0/forward`, Aries RFC 0094.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ForwardMessage {
    #[serde(rename = "@id")]
    pub id: String,
    pub to: String,
    pub msg: EncryptedMessage,
    #[serde(flatten)]
    pub decorators: Decorators,
}

crate::didcomm_message!(ForwardMessage, FORWARD, legacy_prefix);

impl From<ForwardMessage> for ForwardEnvelope {
    fn from(forward: ForwardMessage) -> Self {
        ForwardEnvelope {
            to: forward.to,
            message: forward.msg,
        }
    }
}

/// `routing/2.0/forward`. `next` comes from the v2 body, the envelope is the
/// single JSON attachment.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ForwardMessageV2 {
    #[serde(rename = "@id")]
    pub id: String,
    pub next: String,
    pub attachments: Vec<Attachment>,
    #[serde(flatten)]
    pub decorators: Decorators,
}

impl ForwardMessageV2 {
    fn check(&self) -> Result<()> {
        match self.attachments.as_slice() {
            [single] if single.data.json.is_some() => Ok(()),
            _ => Err(Error::MessageValidation {
                message_type: FORWARD_V2.into(),
                reason: "expected exactly one JSON attachment".into(),
            }),
        }
    }
}

crate::didcomm_message!(ForwardMessageV2, FORWARD_V2, validate = ForwardMessageV2::check);

impl std::convert::TryFrom<ForwardMessageV2> for ForwardEnvelope {
    type Error = Error;

    fn try_from(forward: ForwardMessageV2) -> Result<Self> {
        forward.check()?;
        let json = forward
            .attachments
            .into_iter()
            .next()
            .and_then(|attachment| attachment.data.json)
            .ok_or_else(|| Error::MalformedMessage("forward without attachment".into()))?;
        let message = serde_json::from_value(json)
            .map_err(|e| Error::MalformedEnvelope(e.to_string()))?;
        Ok(ForwardEnvelope {
            to: forward.next,
            message,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Attachment {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub data: AttachmentData,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AttachmentData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
}

impl Attachment {
    pub fn json(value: serde_json::Value) -> Self {
        Attachment {
            id: generate_id(),
            media_type: Some("application/json".into()),
            data: AttachmentData {
                json: Some(value),
                base64: None,
            },
        }
    }
}
