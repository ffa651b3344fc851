//! Bundled DIDComm v2 JOSE provider.
//!
//! Encryption is ECDH-1PU (authenticated) or ECDH-ES (anonymous) over X25519
//! with the content key wrapped per recipient. Signing is EdDSA JWS.
use std::convert::TryFrom;

use async_trait::async_trait;

use super::{
    kdf, CryptoAlgorithm, Cypher, DidResolver, JoseDecrypted, JoseProvider, SecretKind,
    SecretsResolver, SignatureAlgorithm, Signer,
};
use crate::{
    dids::did_from_did_url,
    messages::{
        EncryptedMessage, EphemeralKey, ProtectedHeader, Recipient, RecipientHeader,
        SignatureEntry, SignatureHeader, SignatureProtectedHeader, SignedMessage,
        DIDCOMM_V2_ENCRYPTED_TYP, DIDCOMM_V2_SIGNED_TYP,
    },
    Error, Result,
};

const TAG_LEN: usize = 16;

/// JOSE provider using `algorithm` for both key wrapping and content.
#[derive(Debug, Clone, Copy)]
pub struct JoseCrypto {
    algorithm: CryptoAlgorithm,
}

impl Default for JoseCrypto {
    fn default() -> Self {
        JoseCrypto {
            algorithm: CryptoAlgorithm::XC20P,
        }
    }
}

impl JoseCrypto {
    pub fn new(algorithm: CryptoAlgorithm) -> Self {
        JoseCrypto { algorithm }
    }

    fn key_wrap(&self, authenticated: bool) -> &'static str {
        match (authenticated, self.algorithm) {
            (true, CryptoAlgorithm::XC20P) => "ECDH-1PU+XC20PKW",
            (false, CryptoAlgorithm::XC20P) => "ECDH-ES+XC20PKW",
            (true, CryptoAlgorithm::A256GCM) => "ECDH-1PU+A256KW",
            (false, CryptoAlgorithm::A256GCM) => "ECDH-ES+A256KW",
        }
    }
}

async fn resolve_public_key(kid: &str, dids: &dyn DidResolver) -> Result<Vec<u8>> {
    let did = did_from_did_url(kid).ok_or(Error::BadDid)?;
    dids.resolve(did)
        .await?
        .ok_or_else(|| Error::DidResolveFailed(did.into()))?
        .public_key(kid)
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>> {
    base64_url::decode(segment).map_err(|_| Error::MalformedEnvelope(format!("invalid {}", name)))
}

fn missing(name: &str) -> Error {
    Error::MalformedEnvelope(format!("missing {}", name))
}

#[async_trait]
impl JoseProvider for JoseCrypto {
    async fn encrypt(
        &self,
        payload: &[u8],
        to: &[String],
        from: Option<&str>,
        dids: &dyn DidResolver,
        secrets: &dyn SecretsResolver,
    ) -> Result<EncryptedMessage> {
        if to.is_empty() {
            return Err(Error::Generic("cannot encrypt without recipients".into()));
        }
        let sender_private = match from {
            Some(skid) => {
                let secret = secrets
                    .get_secret(skid)
                    .await?
                    .ok_or_else(|| Error::BadKey(format!("no secret for {}", skid)))?;
                Some(secret.private_key)
            }
            None => None,
        };
        let mut recipient_publics = Vec::with_capacity(to.len());
        for kid in to {
            recipient_publics.push((kid, resolve_public_key(kid, dids).await?));
        }

        let key_wrap = self.key_wrap(from.is_some());
        let protected = ProtectedHeader {
            typ: Some(DIDCOMM_V2_ENCRYPTED_TYP.into()),
            alg: Some(key_wrap.into()),
            enc: Some(self.algorithm.enc().into()),
            skid: from.map(String::from),
            ..Default::default()
        }
        .encode()?;

        let cek: [u8; 32] = rand::random();
        let mut recipients = Vec::with_capacity(to.len());
        for (kid, public_key) in recipient_publics {
            let ephemeral: [u8; 32] = rand::random();
            let ze = kdf::diffie_hellman(&ephemeral, &public_key)?;
            let zs = match &sender_private {
                Some(private_key) => Some(kdf::diffie_hellman(private_key, &public_key)?),
                None => None,
            };
            let kek = kdf::generate_kek(&ze, zs.as_ref().map(|z| &z[..]), key_wrap)?;
            let iv = self.algorithm.generate_nonce();
            let wrapped = self.algorithm.encryptor()(&iv, &kek, &cek, &[])?;
            let (encrypted_key, tag) = wrapped.split_at(wrapped.len() - TAG_LEN);
            recipients.push(Recipient {
                encrypted_key: base64_url::encode(encrypted_key),
                header: RecipientHeader {
                    kid: kid.clone(),
                    iv: Some(base64_url::encode(&iv)),
                    tag: Some(base64_url::encode(tag)),
                    epk: Some(EphemeralKey::x25519(&kdf::x25519_public_key(&ephemeral)?)),
                    ..Default::default()
                },
            });
        }

        let iv = self.algorithm.generate_nonce();
        let sealed = self.algorithm.encryptor()(&iv, &cek, payload, protected.as_bytes())?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        Ok(EncryptedMessage {
            protected,
            recipients,
            iv: base64_url::encode(&iv),
            ciphertext: base64_url::encode(ciphertext),
            tag: base64_url::encode(tag),
        })
    }

    async fn decrypt(
        &self,
        envelope: &EncryptedMessage,
        recipient_kid: &str,
        dids: &dyn DidResolver,
        secrets: &dyn SecretsResolver,
    ) -> Result<JoseDecrypted> {
        let header = envelope.protected_header()?;
        let key_wrap = header.alg.as_deref().ok_or_else(|| missing("alg"))?;
        let wrap_algorithm = CryptoAlgorithm::try_from(key_wrap)?;
        let content_algorithm =
            CryptoAlgorithm::try_from(header.enc.as_deref().ok_or_else(|| missing("enc"))?)?;
        let authenticated = key_wrap.starts_with("ECDH-1PU");

        let recipient = envelope
            .recipients
            .iter()
            .find(|r| r.header.kid == recipient_kid)
            .ok_or(Error::DecryptionFailed)?;
        let secret = secrets
            .get_secret(recipient_kid)
            .await?
            .ok_or(Error::DecryptionFailed)?;
        let (sender_kid, sender_public) = if authenticated {
            let skid = header.skid.clone().ok_or_else(|| missing("skid"))?;
            let public_key = resolve_public_key(&skid, dids).await?;
            (Some(skid), Some(public_key))
        } else {
            (None, None)
        };

        let epk = recipient.header.epk.as_ref().ok_or_else(|| missing("epk"))?;
        let ze = kdf::diffie_hellman(&secret.private_key, &decode_segment(&epk.x, "epk")?)?;
        let zs = match &sender_public {
            Some(public_key) => Some(kdf::diffie_hellman(&secret.private_key, public_key)?),
            None => None,
        };
        let kek = kdf::generate_kek(&ze, zs.as_ref().map(|z| &z[..]), key_wrap)?;

        let mut wrapped = decode_segment(&recipient.encrypted_key, "encrypted_key")?;
        wrapped.extend(decode_segment(
            recipient.header.tag.as_deref().ok_or_else(|| missing("tag"))?,
            "tag",
        )?);
        let wrap_iv = decode_segment(recipient.header.iv.as_deref().ok_or_else(|| missing("iv"))?, "iv")?;
        let cek = wrap_algorithm.decryptor()(&wrap_iv, &kek, &wrapped, &[])?;

        let mut sealed = decode_segment(&envelope.ciphertext, "ciphertext")?;
        sealed.extend(decode_segment(&envelope.tag, "tag")?);
        let plaintext = content_algorithm.decryptor()(
            &decode_segment(&envelope.iv, "iv")?,
            &cek,
            &sealed,
            envelope.protected.as_bytes(),
        )?;
        Ok(JoseDecrypted {
            plaintext,
            sender_kid,
        })
    }

    async fn sign(
        &self,
        payload: &[u8],
        signer_kid: &str,
        secrets: &dyn SecretsResolver,
    ) -> Result<SignedMessage> {
        let secret = secrets
            .get_secret(signer_kid)
            .await?
            .ok_or_else(|| Error::BadKey(format!("no secret for {}", signer_kid)))?;
        if secret.kind != SecretKind::Ed25519 {
            return Err(Error::BadKey(format!("{} is not a signing key", signer_kid)));
        }
        let protected = SignatureProtectedHeader {
            typ: DIDCOMM_V2_SIGNED_TYP.into(),
            alg: SignatureAlgorithm::EdDsa.alg().into(),
        }
        .encode()?;
        let payload = base64_url::encode(payload);
        let mut entry = SignatureEntry {
            protected,
            signature: vec![],
            header: SignatureHeader {
                kid: signer_kid.into(),
            },
        };
        entry.signature =
            SignatureAlgorithm::EdDsa.signer()(&secret.private_key, &entry.signing_input(&payload))?;
        Ok(SignedMessage {
            payload,
            signatures: vec![entry],
        })
    }

    async fn verify(
        &self,
        message: &SignedMessage,
        dids: &dyn DidResolver,
    ) -> Result<(Vec<u8>, String)> {
        let entry = message
            .signatures
            .first()
            .ok_or_else(|| Error::MalformedEnvelope("no signatures".into()))?;
        let algorithm = SignatureAlgorithm::try_from(entry.protected_header()?.alg.as_str())?;
        let public_key = resolve_public_key(&entry.header.kid, dids).await?;
        let valid = algorithm.validator()(
            &public_key,
            &entry.signing_input(&message.payload),
            &entry.signature,
        )?;
        if !valid {
            return Err(Error::InvalidSignature);
        }
        Ok((decode_segment(&message.payload, "payload")?, entry.header.kid.clone()))
    }
}
