//! Wire shapes of encrypted (JWE) and signed (JWS) DIDComm envelopes.
use serde_json::{Map, Value};

use super::{
    plaintext::{DidCommVersion, PlaintextMessage},
    serialization::{base64_buffer, decode_header, encode_header},
};
use crate::{Error, Result};

/// `typ` of DIDComm v2 encrypted envelopes.
pub const DIDCOMM_V2_ENCRYPTED_TYP: &str = "application/didcomm-encrypted+json";
/// `typ` of DIDComm v2 signed envelopes.
pub const DIDCOMM_V2_SIGNED_TYP: &str = "application/didcomm-signed+json";
/// `typ` of DIDComm v1 envelopes.
pub const DIDCOMM_V1_TYP: &str = "JWM/1.0";

/// JWE envelope, general JSON serialization.
///
/// `protected` is kept as the exact base64url segment received, since it is
/// authenticated as additional data of the content encryption.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EncryptedMessage {
    pub protected: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<Recipient>,
    pub iv: String,
    pub ciphertext: String,
    pub tag: String,
}

/// Per recipient key wrapping data.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Recipient {
    pub encrypted_key: String,
    pub header: RecipientHeader,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct RecipientHeader {
    pub kid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epk: Option<EphemeralKey>,
}

/// Ephemeral public key of an ECDH key agreement, as a JWK.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EphemeralKey {
    pub kty: String,
    pub crv: String,
    pub x: String,
}

impl EphemeralKey {
    pub fn x25519(public_key: &[u8]) -> Self {
        EphemeralKey {
            kty: "OKP".into(),
            crv: "X25519".into(),
            x: base64_url::encode(public_key),
        }
    }
}

/// Decoded `protected` segment of an [`EncryptedMessage`].
///
/// Only the fields needed for version dispatch are typed. Everything else
/// is kept for the version adapters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ProtectedHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skid: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<Recipient>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl ProtectedHeader {
    pub fn encode(&self) -> Result<String> {
        encode_header(self)
    }

    /// Envelope version declared by the `alg`/`typ` tags.
    pub fn version(&self) -> Result<DidCommVersion> {
        match (self.alg.as_deref(), self.typ.as_deref()) {
            (Some("Authcrypt"), _) | (Some("Anoncrypt"), _) => Ok(DidCommVersion::V1),
            (_, Some(DIDCOMM_V2_ENCRYPTED_TYP)) => Ok(DidCommVersion::V2),
            (Some(alg), _) if alg.starts_with("ECDH-") => Ok(DidCommVersion::V2),
            (alg, typ) => Err(Error::UnsupportedVersion(format!(
                "alg {}, typ {}",
                alg.unwrap_or("<none>"),
                typ.unwrap_or("<none>")
            ))),
        }
    }
}

impl EncryptedMessage {
    /// Decodes only the `protected` segment. The ciphertext is not touched.
    pub fn protected_header(&self) -> Result<ProtectedHeader> {
        decode_header(&self.protected)
    }

    /// Key identifiers this envelope is encrypted to, in envelope order.
    ///
    /// V1 envelopes carry their recipients inside the protected header.
    pub fn recipient_kids(&self) -> Result<Vec<String>> {
        if !self.recipients.is_empty() {
            return Ok(self.recipients.iter().map(|r| r.header.kid.clone()).collect());
        }
        Ok(self
            .protected_header()?
            .recipients
            .into_iter()
            .map(|r| r.header.kid)
            .collect())
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Signed (JWS) envelope, general JSON serialization.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SignedMessage {
    pub payload: String,
    pub signatures: Vec<SignatureEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SignatureEntry {
    pub protected: String,
    #[serde(with = "base64_buffer")]
    pub signature: Vec<u8>,
    pub header: SignatureHeader,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SignatureHeader {
    pub kid: String,
}

/// Decoded `protected` segment of a [`SignatureEntry`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SignatureProtectedHeader {
    pub typ: String,
    pub alg: String,
}

impl SignatureProtectedHeader {
    pub fn encode(&self) -> Result<String> {
        encode_header(self)
    }
}

impl SignatureEntry {
    pub fn protected_header(&self) -> Result<SignatureProtectedHeader> {
        decode_header(&self.protected)
    }

    /// JWS signing input for this entry and `payload`.
    pub fn signing_input(&self, payload: &str) -> Vec<u8> {
        format!("{}.{}", self.protected, payload).into_bytes()
    }
}

/// Checks the JWE shape without decoding anything: `protected`, `iv`,
/// `ciphertext` and `tag` must all be present and be strings.
pub fn is_valid_jwe_structure(value: &Value) -> bool {
    match value.as_object() {
        Some(object) => ["protected", "iv", "ciphertext", "tag"]
            .iter()
            .all(|field| object.get(*field).map(Value::is_string).unwrap_or(false)),
        None => false,
    }
}

fn is_valid_jws_structure(value: &Value) -> bool {
    match value.as_object() {
        Some(object) => {
            object.get("payload").map(Value::is_string).unwrap_or(false)
                && object.get("signatures").map(Value::is_array).unwrap_or(false)
        }
        None => false,
    }
}

/// Inbound bytes, classified by shape.
#[derive(Debug, Clone)]
pub enum InboundPayload {
    Encrypted(EncryptedMessage),
    Signed(SignedMessage),
    Plaintext(PlaintextMessage),
}

impl InboundPayload {
    /// Classifies raw transport bytes. No cryptographic work happens here.
    pub fn classify(raw: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(raw).map_err(|_| Error::UnrecognizedFormat)?;
        if is_valid_jwe_structure(&value) {
            let envelope = serde_json::from_value(value)
                .map_err(|e| Error::MalformedEnvelope(e.to_string()))?;
            return Ok(InboundPayload::Encrypted(envelope));
        }
        if is_valid_jws_structure(&value) {
            let signed = serde_json::from_value(value)
                .map_err(|e| Error::MalformedEnvelope(e.to_string()))?;
            return Ok(InboundPayload::Signed(signed));
        }
        match value {
            Value::Object(map) if map.contains_key("@type") || map.contains_key("type") => {
                Ok(InboundPayload::Plaintext(PlaintextMessage::from_map(map)))
            }
            _ => Err(Error::UnrecognizedFormat),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn jwe_structure_requires_all_string_fields() {
        let full = json!({"protected": "a", "iv": "b", "ciphertext": "c", "tag": "d"});
        assert!(is_valid_jwe_structure(&full));
        for missing in ["protected", "iv", "ciphertext", "tag"] {
            let mut partial = full.clone();
            partial.as_object_mut().unwrap().remove(missing);
            assert!(!is_valid_jwe_structure(&partial), "{} missing", missing);
        }
        let numeric = json!({"protected": "a", "iv": 1, "ciphertext": "c", "tag": "d"});
        assert!(!is_valid_jwe_structure(&numeric));
    }

    #[test]
    fn classify_plaintext_and_garbage() {
        let plaintext = br#"{"@type":"https://didcomm.org/basicmessage/1.0/message","@id":"1"}"#;
        assert!(matches!(
            InboundPayload::classify(plaintext),
            Ok(InboundPayload::Plaintext(_))
        ));
        assert!(matches!(
            InboundPayload::classify(b"not json"),
            Err(Error::UnrecognizedFormat)
        ));
        assert!(matches!(
            InboundPayload::classify(br#"{"hello":"world"}"#),
            Err(Error::UnrecognizedFormat)
        ));
    }

    #[test]
    fn version_from_protected_tags() {
        let v1 = ProtectedHeader {
            alg: Some("Authcrypt".into()),
            typ: Some(DIDCOMM_V1_TYP.into()),
            ..Default::default()
        };
        assert_eq!(v1.version().unwrap(), DidCommVersion::V1);
        let v2 = ProtectedHeader {
            alg: Some("ECDH-ES+XC20PKW".into()),
            ..Default::default()
        };
        assert_eq!(v2.version().unwrap(), DidCommVersion::V2);
        let unknown = ProtectedHeader {
            alg: Some("RSA1_5".into()),
            ..Default::default()
        };
        assert!(matches!(unknown.version(), Err(Error::UnsupportedVersion(_))));
    }
}
