use chrono::{DateTime, Utc};

use super::{agent_message::generate_id, decorators::Decorators};

pub const BASIC_MESSAGE: &str = "https://didcomm.org/basicmessage/1.0/message";

/// `basicmessage/1.0/message`, Aries RFC 0095.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BasicMessage {
    #[serde(rename = "@id")]
    pub id: String,
    pub content: String,
    pub sent_time: DateTime<Utc>,
    #[serde(flatten)]
    pub decorators: Decorators,
}

impl BasicMessage {
    pub fn new(content: &str) -> Self {
        BasicMessage {
            id: generate_id(),
            content: content.into(),
            sent_time: Utc::now(),
            decorators: Decorators::default(),
        }
    }
}

crate::didcomm_message!(BasicMessage, BASIC_MESSAGE, legacy_prefix);
