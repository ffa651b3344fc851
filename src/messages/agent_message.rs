use std::{any::Any, fmt, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use super::{
    decorators::Decorators,
    plaintext::{DidCommVersion, PlaintextMessage},
};
use crate::{Error, Result};

/// A typed DIDComm message schema.
///
/// Implementors (de)serialize from the canonical plaintext form without the
/// `@type` field, which the pipeline adds from [`DidCommMessage::TYPE`].
pub trait DidCommMessage: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static {
    /// Canonical message type URI.
    const TYPE: &'static str;
    /// Whether the legacy `did:sov` type prefix may be emitted for this schema.
    const ALLOW_DID_SOV_PREFIX: bool = false;

    fn id(&self) -> &str;
    fn decorators(&self) -> &Decorators;
    fn decorators_mut(&mut self) -> &mut Decorators;

    /// Schema checks beyond what deserialization enforces.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Implements [`DidCommMessage`] for a struct with `id` and `decorators` fields.
///
/// ```ignore
/// didcomm_message!(BasicMessage, "https://didcomm.org/basicmessage/1.0/message", legacy_prefix);
/// didcomm_message!(KeylistUpdate, KEYLIST_UPDATE, validate = KeylistUpdate::check);
/// ```
#[macro_export]
macro_rules! didcomm_message {
    (@impl $name:ident, $uri:expr, $legacy:expr, $validate:expr) => {
        impl $crate::messages::DidCommMessage for $name {
            const TYPE: &'static str = $uri;
            const ALLOW_DID_SOV_PREFIX: bool = $legacy;

            fn id(&self) -> &str {
                &self.id
            }

            fn decorators(&self) -> &$crate::messages::Decorators {
                &self.decorators
            }

            fn decorators_mut(&mut self) -> &mut $crate::messages::Decorators {
                &mut self.decorators
            }

            fn validate(&self) -> $crate::Result<()> {
                ($validate)(self)
            }
        }
    };
    ($name:ident, $uri:expr) => {
        $crate::didcomm_message!(@impl $name, $uri, false, |_: &$name| Ok(()));
    };
    ($name:ident, $uri:expr, legacy_prefix) => {
        $crate::didcomm_message!(@impl $name, $uri, true, |_: &$name| Ok(()));
    };
    ($name:ident, $uri:expr, validate = $validate:expr) => {
        $crate::didcomm_message!(@impl $name, $uri, false, $validate);
    };
    ($name:ident, $uri:expr, legacy_prefix, validate = $validate:expr) => {
        $crate::didcomm_message!(@impl $name, $uri, true, $validate);
    };
}

/// Canonical JSON of a typed message, with its `@type`.
pub fn to_canonical<M: DidCommMessage>(message: &M) -> Result<Map<String, Value>> {
    match serde_json::to_value(message)? {
        Value::Object(mut map) => {
            map.insert("@type".into(), Value::String(M::TYPE.into()));
            Ok(map)
        }
        _ => Err(Error::Generic(format!("{} did not serialize to an object", M::TYPE))),
    }
}

/// Type erased typed message, as produced by the message resolver and
/// carried through dispatch, sessions and outbound sends.
#[derive(Clone)]
pub struct AgentMessage {
    message_type: &'static str,
    id: String,
    decorators: Decorators,
    allow_did_sov_prefix: bool,
    canonical: Map<String, Value>,
    inner: Arc<dyn Any + Send + Sync>,
}

impl AgentMessage {
    pub fn new<M: DidCommMessage>(message: M) -> Result<Self> {
        Ok(AgentMessage {
            message_type: M::TYPE,
            id: message.id().to_string(),
            decorators: message.decorators().clone(),
            allow_did_sov_prefix: M::ALLOW_DID_SOV_PREFIX,
            canonical: to_canonical(&message)?,
            inner: Arc::new(message),
        })
    }

    pub fn downcast_ref<M: DidCommMessage>(&self) -> Option<&M> {
        self.inner.downcast_ref::<M>()
    }

    pub fn is<M: DidCommMessage>(&self) -> bool {
        self.inner.is::<M>()
    }

    /// Registered (canonical) type URI of the schema.
    pub fn message_type(&self) -> &str {
        self.message_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn decorators(&self) -> &Decorators {
        &self.decorators
    }

    pub fn thread_id(&self) -> &str {
        self.decorators.thread_id(&self.id)
    }

    pub fn has_any_return_route(&self) -> bool {
        self.decorators.has_any_return_route()
    }

    pub fn has_return_routing(&self, thid: Option<&str>) -> bool {
        self.decorators.has_return_routing(&self.id, thid)
    }

    /// Plaintext wire form for `version`.
    pub fn to_plaintext(&self, version: DidCommVersion, use_did_sov_prefix: bool) -> PlaintextMessage {
        PlaintextMessage::from_canonical(
            self.canonical.clone(),
            version,
            use_did_sov_prefix && self.allow_did_sov_prefix,
        )
    }
}

impl fmt::Debug for AgentMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentMessage")
            .field("type", &self.message_type)
            .field("id", &self.id)
            .field("decorators", &self.decorators)
            .finish()
    }
}

/// Fresh message id.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{BasicMessage, ReturnRoute, Thread};

    #[test]
    fn agent_message_keeps_type_and_downcasts() {
        let basic = BasicMessage::new("hello");
        let id = basic.id.clone();
        let message = AgentMessage::new(basic).unwrap();
        assert_eq!(message.message_type(), BasicMessage::TYPE);
        assert_eq!(message.id(), id);
        assert_eq!(message.thread_id(), id);
        assert_eq!(message.downcast_ref::<BasicMessage>().unwrap().content, "hello");
    }

    #[test]
    fn legacy_prefix_is_emitted_only_when_allowed_and_asked() {
        let message = AgentMessage::new(BasicMessage::new("hi")).unwrap();
        let modern = message.to_plaintext(DidCommVersion::V1, false);
        assert_eq!(modern.message_type(), Some(BasicMessage::TYPE));
        let legacy = message.to_plaintext(DidCommVersion::V1, true);
        assert!(legacy.message_type().unwrap().starts_with("did:sov:"));
    }

    #[test]
    fn return_routing_follows_decorators() {
        let mut basic = BasicMessage::new("hi");
        basic.decorators = Decorators::default()
            .with_thread(Thread::implicit_reply("t-1"))
            .with_return_route(ReturnRoute::Thread);
        let message = AgentMessage::new(basic).unwrap();
        assert!(message.has_any_return_route());
        assert!(message.has_return_routing(Some("t-1")));
        assert!(!message.has_return_routing(Some("t-2")));
    }
}
