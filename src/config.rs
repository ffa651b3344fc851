//! Agent configuration.
use crate::Result;

/// What a relay does with the blob of a forward message.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageForwardingStrategy {
    /// Send to the owning relationship right away.
    DirectDelivery,
    /// Keep in the message queue for pickup.
    QueueOnly,
}

impl Default for MessageForwardingStrategy {
    fn default() -> Self {
        MessageForwardingStrategy::DirectDelivery
    }
}

/// Preferred order of destination URL schemes.
///
/// With `restrictive` set, services whose scheme is not listed are dropped.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportPriority {
    pub schemes: Vec<String>,
    #[serde(default)]
    pub restrictive: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct AgentConfig {
    pub label: String,
    pub use_did_sov_prefix_where_allowed: bool,
    pub forwarding_strategy: MessageForwardingStrategy,
    pub transport_priority: Option<TransportPriority>,
}

impl AgentConfig {
    pub fn new(label: &str) -> Self {
        AgentConfig {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
