use super::*;
use std::convert::TryFrom;

/// Plugable closure generator enum, which creates instance of crypto function
///     based on selected algorythm types.
/// # Attention:
/// Immutable by design and should be instance per invocation to make sure no
///     sensitive data is been stored in memory longer than necessary.
/// Underlying algorithms are implemented by Rust-crypto crate family.
///
/// Both variants take a 32 byte key. `XC20P` expects a 24 byte nonce, `A256GCM` a 12 byte one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CryptoAlgorithm {
    XC20P,
    A256GCM,
}

impl CryptoAlgorithm {
    /// Nonce length in bytes required by this algorithm.
    pub fn nonce_len(&self) -> usize {
        match self {
            CryptoAlgorithm::XC20P => 24,
            CryptoAlgorithm::A256GCM => 12,
        }
    }

    /// Fresh random nonce of the right length.
    pub fn generate_nonce(&self) -> Vec<u8> {
        match self {
            CryptoAlgorithm::XC20P => rand::random::<[u8; 24]>().to_vec(),
            CryptoAlgorithm::A256GCM => rand::random::<[u8; 12]>().to_vec(),
        }
    }

    /// JWA `enc` value for content encryption.
    pub fn enc(&self) -> &'static str {
        match self {
            CryptoAlgorithm::XC20P => "XC20P",
            CryptoAlgorithm::A256GCM => "A256GCM",
        }
    }
}

impl Cypher for CryptoAlgorithm {
    /// Generates + invokes crypto of `SymmetricCypherMethod` which perfoms encryption.
    /// Algorithm selected is based on struct's `CryptoAlgorithm` property.
    fn encryptor(&self) -> SymmetricCypherMethod {
        match self {
            CryptoAlgorithm::XC20P => Box::new(
                |nonce: &[u8], key: &[u8], message: &[u8], aad: &[u8]| -> Result<Vec<u8>> {
                    check_nonce(nonce, 24)?;
                    check_key(key)?;
                    use chacha20poly1305::{
                        aead::{Aead, NewAead, Payload},
                        XChaCha20Poly1305, XNonce,
                    };
                    let nonce = XNonce::from_slice(&nonce[..24]);
                    let aead = XChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key));
                    aead.encrypt(nonce, Payload { msg: message, aad })
                        .map_err(|_| Error::PlugCryptoFailure)
                },
            ),
            CryptoAlgorithm::A256GCM => Box::new(
                |nonce: &[u8], key: &[u8], message: &[u8], aad: &[u8]| -> Result<Vec<u8>> {
                    check_nonce(nonce, 12)?;
                    check_key(key)?;
                    use aes_gcm::{
                        aead::{generic_array::GenericArray, Aead, NewAead, Payload},
                        Aes256Gcm,
                    };
                    let nonce = GenericArray::from_slice(&nonce[..12]);
                    let aead = Aes256Gcm::new(GenericArray::from_slice(key));
                    aead.encrypt(nonce, Payload { msg: message, aad })
                        .map_err(|_| Error::PlugCryptoFailure)
                },
            ),
        }
    }

    /// Generates + invokes crypto of `SymmetricCypherMethod` which perfoms decryption.
    /// Any authentication failure is reported as `Error::DecryptionFailed`.
    fn decryptor(&self) -> SymmetricCypherMethod {
        match self {
            CryptoAlgorithm::XC20P => Box::new(
                |nonce: &[u8], key: &[u8], message: &[u8], aad: &[u8]| -> Result<Vec<u8>> {
                    check_nonce(nonce, 24).map_err(|_| Error::DecryptionFailed)?;
                    check_key(key).map_err(|_| Error::DecryptionFailed)?;
                    use chacha20poly1305::{
                        aead::{Aead, NewAead, Payload},
                        XChaCha20Poly1305, XNonce,
                    };
                    let aead = XChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key));
                    let nonce = XNonce::from_slice(&nonce[..24]);
                    aead.decrypt(nonce, Payload { msg: message, aad })
                        .map_err(|_| Error::DecryptionFailed)
                },
            ),
            CryptoAlgorithm::A256GCM => Box::new(
                |nonce: &[u8], key: &[u8], message: &[u8], aad: &[u8]| -> Result<Vec<u8>> {
                    check_nonce(nonce, 12).map_err(|_| Error::DecryptionFailed)?;
                    check_key(key).map_err(|_| Error::DecryptionFailed)?;
                    use aes_gcm::{
                        aead::{generic_array::GenericArray, Aead, NewAead, Payload},
                        Aes256Gcm,
                    };
                    let nonce = GenericArray::from_slice(&nonce[..12]);
                    let aead = Aes256Gcm::new(GenericArray::from_slice(key));
                    aead.decrypt(nonce, Payload { msg: message, aad })
                        .map_err(|_| Error::DecryptionFailed)
                },
            ),
        }
    }
}

impl TryFrom<&str> for CryptoAlgorithm {
    type Error = Error;
    fn try_from(incoming: &str) -> Result<Self> {
        match incoming {
            "ECDH-1PU+A256KW" | "ECDH-ES+A256KW" | "A256GCM" => Ok(Self::A256GCM),
            "ECDH-1PU+XC20PKW" | "ECDH-ES+XC20PKW" | "XC20P" | "xchacha20poly1305_ietf" => {
                Ok(Self::XC20P)
            }
            other => Err(Error::UnsupportedVersion(other.into())),
        }
    }
}

// inner helper functions
fn check_nonce(nonce: &[u8], expected_len: usize) -> Result<()> {
    if nonce.len() < expected_len {
        return Err(Error::PlugCryptoFailure);
    }
    Ok(())
}

fn check_key(key: &[u8]) -> Result<()> {
    if key.len() != 32 {
        return Err(Error::BadKey(format!("expected 32 byte key, got {}", key.len())));
    }
    Ok(())
}

#[cfg(test)]
mod batteries_tests {
    use super::*;

    #[test]
    fn xc20p_test() -> Result<()> {
        // Arrange
        let payload = br#"{"test":"message's body - can be anything..."}"#;
        let key = b"super duper key 32 bytes long!!!";
        let nonce = CryptoAlgorithm::XC20P.generate_nonce();
        let aad = b"protected header";
        // Act
        let sealed = CryptoAlgorithm::XC20P.encryptor()(&nonce, &key[..], &payload[..], &aad[..])?;
        let opened = CryptoAlgorithm::XC20P.decryptor()(&nonce, &key[..], &sealed, &aad[..])?;
        // Assert
        assert_ne!(&sealed[..], &payload[..]);
        assert_eq!(&opened[..], &payload[..]);
        Ok(())
    }

    #[test]
    fn a256gcm_test() -> Result<()> {
        // Arrange
        let payload = br#"{"example":"message's body - can be anything..."}"#;
        let key = b"super duper key 32 bytes long!!!";
        let nonce = CryptoAlgorithm::A256GCM.generate_nonce();
        // Act
        let sealed = CryptoAlgorithm::A256GCM.encryptor()(&nonce, &key[..], &payload[..], &[])?;
        let opened = CryptoAlgorithm::A256GCM.decryptor()(&nonce, &key[..], &sealed, &[])?;
        // Assert
        assert_eq!(&opened[..], &payload[..]);
        Ok(())
    }

    #[test]
    fn tampered_aad_is_opaque_failure() -> Result<()> {
        let key = b"super duper key 32 bytes long!!!";
        let nonce = CryptoAlgorithm::XC20P.generate_nonce();
        let sealed = CryptoAlgorithm::XC20P.encryptor()(&nonce, &key[..], b"body", b"aad")?;
        let opened = CryptoAlgorithm::XC20P.decryptor()(&nonce, &key[..], &sealed, b"other");
        assert!(matches!(opened, Err(Error::DecryptionFailed)));
        Ok(())
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        assert!(CryptoAlgorithm::try_from("RSA-OAEP").is_err());
        assert_eq!(
            CryptoAlgorithm::try_from("ECDH-1PU+XC20PKW").ok(),
            Some(CryptoAlgorithm::XC20P)
        );
    }
}
