use serde_json::{Map, Value};

use super::message_type::{replace_legacy_did_sov_prefix, replace_new_did_comm_prefix_with_legacy};
use crate::{Error, Result};

/// DIDComm protocol generation of a message or envelope.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DidCommVersion {
    V1,
    V2,
}

impl Default for DidCommVersion {
    fn default() -> Self {
        DidCommVersion::V1
    }
}

/// Top level header names of a v2 plaintext message that stay outside `body`.
const V2_HEADERS: &[&str] = &[
    "from",
    "to",
    "created_time",
    "expires_time",
    "from_prior",
    "attachments",
];

/// Open ended plaintext DIDComm message.
///
/// V1 messages carry `@type`/`@id` and decorators at the top level, v2
/// messages carry `type`/`id` and a `body`. Typed message schemas are always
/// deserialized from the v1 shaped *canonical* form, see [`PlaintextMessage::into_canonical`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct PlaintextMessage(Map<String, Value>);

impl PlaintextMessage {
    pub fn from_map(map: Map<String, Value>) -> Self {
        PlaintextMessage(map)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match serde_json::from_slice(bytes) {
            Ok(Value::Object(map)) => Ok(PlaintextMessage(map)),
            Ok(_) => Err(Error::MalformedMessage("plaintext must be a JSON object".into())),
            Err(e) => Err(Error::MalformedMessage(e.to_string())),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Version, from which type field is present. Exactly one must be.
    pub fn version(&self) -> Result<DidCommVersion> {
        match (type_field(&self.0, "@type"), type_field(&self.0, "type")) {
            (Some(_), None) => Ok(DidCommVersion::V1),
            (None, Some(_)) => Ok(DidCommVersion::V2),
            (Some(_), Some(_)) => Err(Error::MalformedMessage(
                "both @type and type are present".into(),
            )),
            (None, None) => Err(Error::MalformedMessage("missing message type".into())),
        }
    }

    pub fn message_type(&self) -> Option<&str> {
        type_field(&self.0, "@type").or_else(|| type_field(&self.0, "type"))
    }

    pub fn id(&self) -> Option<&str> {
        self.0
            .get("@id")
            .or_else(|| self.0.get("id"))
            .and_then(Value::as_str)
    }

    /// Normalizes into the canonical (v1 shaped, `https://didcomm.org`
    /// prefixed) form the typed schemas deserialize from.
    pub fn into_canonical(self) -> Result<(DidCommVersion, Map<String, Value>)> {
        let version = self.version()?;
        let mut map = match version {
            DidCommVersion::V1 => self.0,
            DidCommVersion::V2 => v2_to_canonical(self.0),
        };
        if let Some(Value::String(message_type)) = map.get_mut("@type") {
            *message_type = replace_legacy_did_sov_prefix(message_type);
        }
        Ok((version, map))
    }

    /// Emits a canonical message in the wire shape of `version`.
    ///
    /// `use_legacy_prefix` re-emits the `did:sov` type prefix, v1 only.
    pub fn from_canonical(
        mut canonical: Map<String, Value>,
        version: DidCommVersion,
        use_legacy_prefix: bool,
    ) -> Self {
        match version {
            DidCommVersion::V1 => {
                if use_legacy_prefix {
                    if let Some(Value::String(message_type)) = canonical.get_mut("@type") {
                        *message_type = replace_new_did_comm_prefix_with_legacy(message_type);
                    }
                }
                PlaintextMessage(canonical)
            }
            DidCommVersion::V2 => PlaintextMessage(canonical_to_v2(canonical)),
        }
    }
}

fn type_field<'a>(map: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    map.get(name).and_then(Value::as_str)
}

fn v2_to_canonical(mut map: Map<String, Value>) -> Map<String, Value> {
    let mut canonical = Map::new();
    if let Some(id) = map.remove("id") {
        canonical.insert("@id".into(), id);
    }
    if let Some(message_type) = map.remove("type") {
        canonical.insert("@type".into(), message_type);
    }
    let mut thread = Map::new();
    for field in ["thid", "pthid"] {
        if let Some(value) = map.remove(field) {
            thread.insert(field.into(), value);
        }
    }
    if !thread.is_empty() {
        canonical.insert("~thread".into(), Value::Object(thread));
    }
    if let Some(return_route) = map.remove("return_route") {
        let mut transport = Map::new();
        transport.insert("return_route".into(), return_route);
        canonical.insert("~transport".into(), Value::Object(transport));
    }
    let body = map.remove("body");
    canonical.extend(map);
    if let Some(Value::Object(body)) = body {
        for (key, value) in body {
            canonical.entry(key).or_insert(value);
        }
    }
    canonical
}

fn canonical_to_v2(mut canonical: Map<String, Value>) -> Map<String, Value> {
    let mut map = Map::new();
    if let Some(id) = canonical.remove("@id") {
        map.insert("id".into(), id);
    }
    if let Some(message_type) = canonical.remove("@type") {
        map.insert("type".into(), message_type);
    }
    if let Some(Value::Object(mut thread)) = canonical.remove("~thread") {
        for field in ["thid", "pthid"] {
            match thread.remove(field) {
                Some(Value::String(s)) if s.is_empty() => {}
                Some(value) => {
                    map.insert(field.into(), value);
                }
                None => {}
            }
        }
    }
    if let Some(Value::Object(mut transport)) = canonical.remove("~transport") {
        if let Some(return_route) = transport.remove("return_route") {
            map.insert("return_route".into(), return_route);
        }
    }
    let mut body = Map::new();
    for (key, value) in canonical {
        if key.starts_with('~') {
            continue;
        }
        if V2_HEADERS.contains(&key.as_str()) {
            map.insert(key, value);
        } else {
            body.insert(key, value);
        }
    }
    map.insert("body".into(), Value::Object(body));
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plaintext(value: Value) -> PlaintextMessage {
        PlaintextMessage::from_map(value.as_object().unwrap().clone())
    }

    #[test]
    fn version_requires_exactly_one_type_field() {
        assert_eq!(
            plaintext(json!({"@type": "a/b/1.0/c"})).version().unwrap(),
            DidCommVersion::V1
        );
        assert_eq!(
            plaintext(json!({"type": "a/b/1.0/c"})).version().unwrap(),
            DidCommVersion::V2
        );
        assert!(plaintext(json!({"@type": "x", "type": "y"})).version().is_err());
        assert!(plaintext(json!({"id": "1"})).version().is_err());
    }

    #[test]
    fn v1_legacy_prefix_is_normalized() {
        let message = plaintext(json!({
            "@type": "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/basicmessage/1.0/message",
            "@id": "abc",
            "content": "hi"
        }));
        let (version, canonical) = message.into_canonical().unwrap();
        assert_eq!(version, DidCommVersion::V1);
        assert_eq!(canonical["@type"], "https://didcomm.org/basicmessage/1.0/message");
        let legacy = PlaintextMessage::from_canonical(canonical, DidCommVersion::V1, true);
        assert_eq!(
            legacy.message_type(),
            Some("did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/basicmessage/1.0/message")
        );
    }

    #[test]
    fn v2_shape_round_trips_through_canonical() {
        let wire = json!({
            "id": "1234",
            "type": "https://didcomm.org/basicmessage/2.0/message",
            "thid": "thread-1",
            "return_route": "all",
            "to": ["did:example:bob"],
            "body": {"content": "hello"}
        });
        let (version, canonical) = plaintext(wire.clone()).into_canonical().unwrap();
        assert_eq!(version, DidCommVersion::V2);
        assert_eq!(canonical["@id"], "1234");
        assert_eq!(canonical["~thread"]["thid"], "thread-1");
        assert_eq!(canonical["~transport"]["return_route"], "all");
        assert_eq!(canonical["content"], "hello");

        let back = PlaintextMessage::from_canonical(canonical, DidCommVersion::V2, true);
        assert_eq!(Value::Object(back.into_map()), wire);
    }
}
