/// (de)serialzies between `Vec<u8>` and base64url `String`
/// see `<https://users.rust-lang.org/t/serialize-a-vec-u8-to-json-as-base64/57781/2>`
pub(crate) mod base64_buffer {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &[u8], s: S) -> Result<S::Ok, S::Error> {
        let base64 = base64_url::encode(v);
        String::serialize(&base64, s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let base64 = String::deserialize(d)?;
        base64_url::decode(base64.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// Encodes a serializable header as base64url JSON, the way JOSE `protected` segments are built.
pub(crate) fn encode_header<T: serde::Serialize>(header: &T) -> crate::Result<String> {
    let header_string = serde_json::to_string(header)?;
    Ok(base64_url::encode(&header_string))
}

/// Decodes a base64url JSON header segment.
pub(crate) fn decode_header<T: serde::de::DeserializeOwned>(segment: &str) -> crate::Result<T> {
    let header_buffer = base64_url::decode(segment.as_bytes())
        .map_err(|e| crate::Error::MalformedEnvelope(format!("protected header: {}", e)))?;
    serde_json::from_slice(&header_buffer)
        .map_err(|e| crate::Error::MalformedEnvelope(format!("protected header: {}", e)))
}
