use super::*;
use std::convert::TryFrom;

/// Signature related batteries for DIDComm.
/// Implementation of all algorithms required by (spec)[https://identity.foundation/didcomm-messaging/spec/#algorithms]
///
/// Keys are raw bytes: a 32 byte secret scalar/seed for signing, and the
/// public key encoding of the curve for validation (32 bytes for Ed25519,
/// SEC1 for the ECDSA curves).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// `Ed25519` signatures.
    EdDsa,
    /// `ECDSA/P-256` signatures.
    Es256,
    /// `ECDSA/secp256k1` signatures.
    Es256k,
}

impl SignatureAlgorithm {
    /// JWA `alg` value.
    pub fn alg(&self) -> &'static str {
        match self {
            SignatureAlgorithm::EdDsa => "EdDSA",
            SignatureAlgorithm::Es256 => "ES256",
            SignatureAlgorithm::Es256k => "ES256K",
        }
    }
}

impl Signer for SignatureAlgorithm {
    /// Builds signer FnOnce, which performs signing.
    ///
    /// # Examples
    /// ```
    /// # fn main() {
    /// use didcomm_agent::crypto::{Signer, SignatureAlgorithm};
    /// let signer = SignatureAlgorithm::Es256k.signer();
    /// # }
    ///```
    ///
    fn signer(&self) -> SigningMethod {
        match self {
            SignatureAlgorithm::EdDsa => {
                Box::new(|key: &[u8], message: &[u8]| -> Result<Vec<u8>> {
                    use ed25519_dalek::{Keypair, PublicKey, SecretKey, Signer as _};
                    let secret = SecretKey::from_bytes(key)?;
                    let public: PublicKey = (&secret).into();
                    let keypair = Keypair { secret, public };
                    Ok(keypair.sign(message).to_bytes().to_vec())
                })
            }
            SignatureAlgorithm::Es256 => {
                Box::new(|key: &[u8], message: &[u8]| -> Result<Vec<u8>> {
                    use p256::ecdsa::{signature::Signer as _, Signature, SigningKey};
                    let sk = SigningKey::from_bytes(key).map_err(|e| Error::BadKey(e.to_string()))?;
                    let signature: Signature = sk.sign(message);
                    Ok(signature.as_ref().to_vec())
                })
            }
            SignatureAlgorithm::Es256k => {
                Box::new(|key: &[u8], message: &[u8]| -> Result<Vec<u8>> {
                    use k256::ecdsa::{signature::Signer as _, Signature, SigningKey};
                    let sk = SigningKey::from_bytes(key).map_err(|e| Error::BadKey(e.to_string()))?;
                    let signature: Signature = sk.sign(message);
                    Ok(signature.as_ref().to_vec())
                })
            }
        }
    }

    /// Builds validator FnOnce, which performs signature validation.
    /// Malformed signatures validate to `false`, malformed keys are errors.
    ///
    /// # Examples
    /// ```
    /// # fn main() {
    /// use didcomm_agent::crypto::{Signer, SignatureAlgorithm};
    /// let validator = SignatureAlgorithm::Es256k.validator();
    /// # }
    /// ```
    ///
    fn validator(&self) -> ValidationMethod {
        match self {
            SignatureAlgorithm::EdDsa => Box::new(
                |key: &[u8], message: &[u8], signature: &[u8]| -> Result<bool> {
                    use ed25519_dalek::{PublicKey, Signature, Verifier as _};
                    let pk = PublicKey::from_bytes(key)?;
                    let signature = match Signature::try_from(signature) {
                        Ok(signature) => signature,
                        Err(_) => return Ok(false),
                    };
                    Ok(pk.verify(message, &signature).is_ok())
                },
            ),
            SignatureAlgorithm::Es256 => Box::new(
                |key: &[u8], message: &[u8], signature: &[u8]| -> Result<bool> {
                    use p256::ecdsa::{signature::Verifier as _, Signature, VerifyingKey};
                    let vk = VerifyingKey::from_sec1_bytes(key)
                        .map_err(|e| Error::BadKey(e.to_string()))?;
                    let signature = match Signature::try_from(signature) {
                        Ok(signature) => signature,
                        Err(_) => return Ok(false),
                    };
                    Ok(vk.verify(message, &signature).is_ok())
                },
            ),
            SignatureAlgorithm::Es256k => Box::new(
                |key: &[u8], message: &[u8], signature: &[u8]| -> Result<bool> {
                    use k256::ecdsa::{signature::Verifier as _, Signature, VerifyingKey};
                    let vk = VerifyingKey::from_sec1_bytes(key)
                        .map_err(|e| Error::BadKey(e.to_string()))?;
                    let signature = match Signature::try_from(signature) {
                        Ok(signature) => signature,
                        Err(_) => return Ok(false),
                    };
                    Ok(vk.verify(message, &signature).is_ok())
                },
            ),
        }
    }
}

impl TryFrom<&str> for SignatureAlgorithm {
    type Error = Error;
    fn try_from(alg: &str) -> Result<Self> {
        match alg {
            "EdDSA" => Ok(Self::EdDsa),
            "ES256" => Ok(Self::Es256),
            "ES256K" => Ok(Self::Es256k),
            other => Err(Error::BadKey(format!("unsupported signature algorithm {}", other))),
        }
    }
}

/// Ed25519 public key for a 32 byte signing seed.
pub fn ed25519_public_key(seed: &[u8]) -> Result<[u8; 32]> {
    let secret = ed25519_dalek::SecretKey::from_bytes(seed)?;
    let public: ed25519_dalek::PublicKey = (&secret).into();
    Ok(public.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn es256k_test() {
        // Arrange
        let sk = k256::ecdsa::SigningKey::from_bytes(&[0x11; 32]).unwrap();
        let vk = &sk.verify_key();
        let m = b"this is the message we're signing in this test...";
        // Act
        let signer = SignatureAlgorithm::Es256k.signer();
        let validator = SignatureAlgorithm::Es256k.validator();
        let signature = signer(&sk.to_bytes(), m);
        let validation = validator(&vk.to_bytes(), m, &signature.unwrap());
        // Assert
        assert!(&validation.is_ok());
        assert!(validation.unwrap());
    }

    #[test]
    fn es256_test() {
        let sk = p256::ecdsa::SigningKey::from_bytes(&[0x22; 32]).unwrap();
        let vk = p256::ecdsa::VerifyingKey::from(&sk);
        let m = b"p-256 signed content";
        let signature = SignatureAlgorithm::Es256.signer()(&sk.to_bytes(), m).unwrap();
        let encoded = vk.to_encoded_point(false);
        assert!(SignatureAlgorithm::Es256.validator()(encoded.as_bytes(), m, &signature).unwrap());
    }

    #[test]
    fn eddsa_test() {
        let seed = [7u8; 32];
        let public = ed25519_public_key(&seed).unwrap();
        let m = b"signed didcomm payload";
        let signature = SignatureAlgorithm::EdDsa.signer()(&seed, m).unwrap();
        let validator = SignatureAlgorithm::EdDsa.validator();
        assert!(validator(&public, m, &signature).unwrap());
        assert!(!validator(&public, b"another payload", &signature).unwrap());
    }

    #[test]
    fn eddsa_truncated_signature_is_invalid() {
        let seed = [9u8; 32];
        let public = ed25519_public_key(&seed).unwrap();
        assert!(!SignatureAlgorithm::EdDsa.validator()(&public, b"m", &[0u8; 10]).unwrap());
    }
}
