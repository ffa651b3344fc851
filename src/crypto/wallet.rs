use std::collections::HashMap;

use async_trait::async_trait;
use base58::{FromBase58, ToBase58};
use tokio::sync::RwLock;

use super::{
    kdf, CryptoAlgorithm, CryptoProvider, Cypher, Secret, SignatureAlgorithm, Signer,
    UnpackedMessage,
};
use crate::{
    messages::{EncryptedMessage, ProtectedHeader, Recipient, RecipientHeader, DIDCOMM_V1_TYP},
    Error, Result,
};

/// `enc` of v1 envelopes.
const V1_ENC: &str = "xchacha20poly1305_ietf";
const TAG_LEN: usize = 16;

/// In-memory wallet implementing DIDComm v1 authcrypt/anoncrypt.
///
/// Encryption keys are X25519 and addressed by their base58 verkey. Signing
/// keys are Ed25519, also addressed by base58 verkey. V2 secrets are kept
/// separately by key id.
#[derive(Default)]
pub struct LocalWallet {
    keys: RwLock<HashMap<String, [u8; 32]>>,
    signing_keys: RwLock<HashMap<String, [u8; 32]>>,
    secrets: RwLock<HashMap<String, Secret>>,
}

impl LocalWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an X25519 key pair and returns its verkey. Random if no seed given.
    pub async fn create_key(&self, private_key: Option<[u8; 32]>) -> Result<String> {
        let private_key = private_key.unwrap_or_else(rand::random);
        let verkey = kdf::x25519_public_key(&private_key)?.to_base58();
        self.keys.write().await.insert(verkey.clone(), private_key);
        Ok(verkey)
    }

    /// Stores an Ed25519 signing key and returns its verkey.
    pub async fn create_signing_key(&self, seed: Option<[u8; 32]>) -> Result<String> {
        let seed = seed.unwrap_or_else(rand::random);
        let verkey = super::signer::ed25519_public_key(&seed)?.to_base58();
        self.signing_keys.write().await.insert(verkey.clone(), seed);
        Ok(verkey)
    }

    /// Stores v2 key material addressed by key id.
    pub async fn import_secret(&self, secret: Secret) {
        self.secrets.write().await.insert(secret.id.clone(), secret);
    }

    async fn private_key(&self, verkey: &str) -> Result<[u8; 32]> {
        self.keys
            .read()
            .await
            .get(verkey)
            .copied()
            .ok_or_else(|| Error::BadKey(format!("no private key for {}", verkey)))
    }
}

fn decode_verkey(verkey: &str) -> Result<Vec<u8>> {
    let bytes = verkey
        .from_base58()
        .map_err(|_| Error::BadKey(format!("invalid base58 verkey {}", verkey)))?;
    if bytes.len() != 32 {
        return Err(Error::BadKey(format!("verkey {} is not 32 bytes", verkey)));
    }
    Ok(bytes)
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>> {
    base64_url::decode(segment).map_err(|_| Error::MalformedEnvelope(format!("invalid {}", name)))
}

#[async_trait]
impl CryptoProvider for LocalWallet {
    async fn sign(&self, data: &[u8], verkey: &str) -> Result<Vec<u8>> {
        let seed = self
            .signing_keys
            .read()
            .await
            .get(verkey)
            .copied()
            .ok_or_else(|| Error::BadKey(format!("no signing key for {}", verkey)))?;
        SignatureAlgorithm::EdDsa.signer()(&seed, data)
    }

    async fn verify(&self, data: &[u8], signature: &[u8], verkey: &str) -> Result<bool> {
        let public_key = decode_verkey(verkey)?;
        SignatureAlgorithm::EdDsa.validator()(&public_key, data, signature)
    }

    async fn pack(
        &self,
        payload: &[u8],
        recipient_keys: &[String],
        sender_key: Option<&str>,
    ) -> Result<EncryptedMessage> {
        if recipient_keys.is_empty() {
            return Err(Error::Generic("cannot pack without recipient keys".into()));
        }
        let sender = match sender_key {
            Some(verkey) => Some((decode_verkey(verkey)?, self.private_key(verkey).await?, verkey)),
            None => None,
        };
        let cek: [u8; 32] = rand::random();

        let mut recipients = Vec::with_capacity(recipient_keys.len());
        for kid in recipient_keys {
            let recipient_public = decode_verkey(kid)?;
            let recipient = match &sender {
                Some((sender_public, sender_private, sender_verkey)) => {
                    let shared = kdf::diffie_hellman(sender_private, &recipient_public)?;
                    let kek = kdf::concat_kdf(
                        &shared,
                        "Authcrypt",
                        Some(&sender_public[..]),
                        Some(&recipient_public[..]),
                    )?;
                    let iv = CryptoAlgorithm::XC20P.generate_nonce();
                    let encrypted_key = CryptoAlgorithm::XC20P.encryptor()(&iv, &kek, &cek, &[])?;
                    let sealed_sender = kdf::seal(sender_verkey.as_bytes(), &recipient_public)?;
                    Recipient {
                        encrypted_key: base64_url::encode(&encrypted_key),
                        header: RecipientHeader {
                            kid: kid.clone(),
                            sender: Some(base64_url::encode(&sealed_sender)),
                            iv: Some(base64_url::encode(&iv)),
                            ..Default::default()
                        },
                    }
                }
                None => Recipient {
                    encrypted_key: base64_url::encode(&kdf::seal(&cek, &recipient_public)?),
                    header: RecipientHeader {
                        kid: kid.clone(),
                        ..Default::default()
                    },
                },
            };
            trace!("wrapped content key for recipient {}", kid);
            recipients.push(recipient);
        }

        let protected = ProtectedHeader {
            enc: Some(V1_ENC.into()),
            typ: Some(DIDCOMM_V1_TYP.into()),
            alg: Some(if sender.is_some() { "Authcrypt" } else { "Anoncrypt" }.into()),
            recipients,
            ..Default::default()
        }
        .encode()?;

        let iv = CryptoAlgorithm::XC20P.generate_nonce();
        let sealed = CryptoAlgorithm::XC20P.encryptor()(&iv, &cek, payload, protected.as_bytes())?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        Ok(EncryptedMessage {
            protected,
            recipients: vec![],
            iv: base64_url::encode(&iv),
            ciphertext: base64_url::encode(ciphertext),
            tag: base64_url::encode(tag),
        })
    }

    async fn unpack(&self, envelope: &EncryptedMessage) -> Result<UnpackedMessage> {
        let header = envelope.protected_header()?;
        if header.enc.as_deref() != Some(V1_ENC) {
            return Err(Error::UnsupportedVersion(format!(
                "enc {}",
                header.enc.as_deref().unwrap_or("<none>")
            )));
        }
        let found = {
            let keys = self.keys.read().await;
            header
                .recipients
                .iter()
                .find_map(|r| keys.get(&r.header.kid).map(|sk| (r.clone(), *sk)))
        };
        let (recipient, private_key) = found.ok_or_else(|| {
            debug!("no recipient key of this wallet in envelope");
            Error::DecryptionFailed
        })?;
        let encrypted_key = decode_segment(&recipient.encrypted_key, "encrypted_key")?;

        let (cek, sender_key) = match header.alg.as_deref() {
            Some("Authcrypt") => {
                let sealed_sender = recipient
                    .header
                    .sender
                    .as_deref()
                    .ok_or_else(|| Error::MalformedEnvelope("authcrypt without sender".into()))?;
                let sender_verkey =
                    String::from_utf8(kdf::open(&decode_segment(sealed_sender, "sender")?, &private_key)?)
                        .map_err(|_| Error::DecryptionFailed)?;
                let sender_public = decode_verkey(&sender_verkey).map_err(|_| Error::DecryptionFailed)?;
                let recipient_public = kdf::x25519_public_key(&private_key)?;
                let shared = kdf::diffie_hellman(&private_key, &sender_public)?;
                let kek = kdf::concat_kdf(
                    &shared,
                    "Authcrypt",
                    Some(&sender_public[..]),
                    Some(&recipient_public[..]),
                )?;
                let iv = recipient
                    .header
                    .iv
                    .as_deref()
                    .ok_or_else(|| Error::MalformedEnvelope("authcrypt without iv".into()))?;
                let cek = CryptoAlgorithm::XC20P.decryptor()(
                    &decode_segment(iv, "iv")?,
                    &kek,
                    &encrypted_key,
                    &[],
                )?;
                (cek, Some(sender_verkey))
            }
            Some("Anoncrypt") => (kdf::open(&encrypted_key, &private_key)?, None),
            other => {
                return Err(Error::UnsupportedVersion(format!(
                    "alg {}",
                    other.unwrap_or("<none>")
                )))
            }
        };

        let mut ciphertext_and_tag = decode_segment(&envelope.ciphertext, "ciphertext")?;
        ciphertext_and_tag.extend(decode_segment(&envelope.tag, "tag")?);
        let plaintext = CryptoAlgorithm::XC20P.decryptor()(
            &decode_segment(&envelope.iv, "iv")?,
            &cek,
            &ciphertext_and_tag,
            envelope.protected.as_bytes(),
        )?;
        Ok(UnpackedMessage {
            plaintext,
            sender_key,
            recipient_key: recipient.header.kid,
        })
    }

    async fn retrieve_secret(&self, kid: &str) -> Result<Option<Secret>> {
        Ok(self.secrets.read().await.get(kid).cloned())
    }
}
