use base58::{FromBase58, ToBase58};

use super::{agent_message::generate_id, decorators::{Decorators, Thread}};
use crate::{Error, Result};

pub const KEYLIST_UPDATE: &str = "https://didcomm.org/coordinate-mediation/1.0/keylist-update";
pub const KEYLIST_UPDATE_RESPONSE: &str =
    "https://didcomm.org/coordinate-mediation/1.0/keylist-update-response";

/// Multicodec prefix of an Ed25519 public key inside a `did:key`.
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];
/// Multicodec prefix of an X25519 public key inside a `did:key`.
const X25519_MULTICODEC: [u8; 2] = [0xec, 0x01];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeylistUpdateAction {
    Add,
    Remove,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeylistUpdateResult {
    ClientError,
    ServerError,
    NoChange,
    Success,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KeylistUpdateItem {
    pub recipient_key: String,
    pub action: KeylistUpdateAction,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KeylistUpdated {
    pub recipient_key: String,
    pub action: KeylistUpdateAction,
    pub result: KeylistUpdateResult,
}

/// `coordinate-mediation/1.0/keylist-update`, Aries RFC 0211.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KeylistUpdate {
    #[serde(rename = "@id")]
    pub id: String,
    pub updates: Vec<KeylistUpdateItem>,
    #[serde(flatten)]
    pub decorators: Decorators,
}

impl KeylistUpdate {
    pub fn new(updates: Vec<KeylistUpdateItem>) -> Self {
        KeylistUpdate {
            id: generate_id(),
            updates,
            decorators: Decorators::default(),
        }
    }

    fn check(&self) -> Result<()> {
        if self.updates.iter().any(|u| u.recipient_key.is_empty()) {
            return Err(Error::MessageValidation {
                message_type: KEYLIST_UPDATE.into(),
                reason: "recipient_key must not be empty".into(),
            });
        }
        Ok(())
    }
}

crate::didcomm_message!(KeylistUpdate, KEYLIST_UPDATE, legacy_prefix, validate = KeylistUpdate::check);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KeylistUpdateResponse {
    #[serde(rename = "@id")]
    pub id: String,
    pub updated: Vec<KeylistUpdated>,
    #[serde(flatten)]
    pub decorators: Decorators,
}

impl KeylistUpdateResponse {
    /// Response threaded to the update with `thid`.
    pub fn new(thid: &str, updated: Vec<KeylistUpdated>) -> Self {
        KeylistUpdateResponse {
            id: generate_id(),
            updated,
            decorators: Decorators::default().with_thread(Thread::implicit_reply(thid)),
        }
    }
}

crate::didcomm_message!(KeylistUpdateResponse, KEYLIST_UPDATE_RESPONSE, legacy_prefix);

/// Normalizes a recipient key to its base58 verkey.
///
/// Accepts base58 verkeys as is and `did:key` references (with or without
/// fragment) to Ed25519 or X25519 keys.
pub fn verkey_from_key_reference(key: &str) -> Result<String> {
    let multibase = match key.strip_prefix("did:key:") {
        Some(rest) => rest.split('#').next().unwrap_or(rest),
        None => return Ok(key.to_string()),
    };
    let encoded = multibase
        .strip_prefix('z')
        .ok_or_else(|| Error::BadKey(format!("unsupported multibase in {}", key)))?;
    let bytes = encoded
        .from_base58()
        .map_err(|_| Error::BadKey(format!("invalid base58 in {}", key)))?;
    match bytes.split_at(2.min(bytes.len())) {
        (prefix, public) if (prefix == ED25519_MULTICODEC || prefix == X25519_MULTICODEC) && public.len() == 32 => {
            Ok(public.to_base58())
        }
        _ => Err(Error::BadKey(format!("unsupported key type in {}", key))),
    }
}

/// `did:key` reference for an X25519 verkey.
pub fn x25519_did_key(verkey: &str) -> Result<String> {
    let public = verkey
        .from_base58()
        .map_err(|_| Error::BadKey(format!("invalid base58 verkey {}", verkey)))?;
    let mut bytes = X25519_MULTICODEC.to_vec();
    bytes.extend(public);
    Ok(format!("did:key:z{}", bytes.to_base58()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn did_key_references_normalize_to_verkeys() {
        let verkey = [4u8; 32].to_base58();
        let did_key = x25519_did_key(&verkey).unwrap();
        assert!(did_key.starts_with("did:key:z"));
        assert_eq!(verkey_from_key_reference(&did_key).unwrap(), verkey);
        assert_eq!(
            verkey_from_key_reference(&format!("{}#key-1", did_key)).unwrap(),
            verkey
        );
        assert_eq!(verkey_from_key_reference(&verkey).unwrap(), verkey);
        assert!(verkey_from_key_reference("did:key:m123").is_err());
    }

    #[test]
    fn update_wire_shape() {
        let update: KeylistUpdate = serde_json::from_value(json!({
            "@type": KEYLIST_UPDATE,
            "@id": "u-1",
            "updates": [{"recipient_key": "abc", "action": "add"}]
        }))
        .unwrap();
        assert_eq!(update.updates[0].action, KeylistUpdateAction::Add);
        let response = KeylistUpdateResponse::new(
            &update.id,
            vec![KeylistUpdated {
                recipient_key: "abc".into(),
                action: KeylistUpdateAction::Add,
                result: KeylistUpdateResult::NoChange,
            }],
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["updated"][0]["result"], "no_change");
        assert_eq!(json["~thread"]["thid"], "u-1");
    }
}
