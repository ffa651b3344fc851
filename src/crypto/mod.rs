//! Collection of utilities for cryptography related components.
//!
//! The pipeline only depends on the provider traits declared here. The
//! `raw-crypto` feature adds reference implementations built on the
//! Rust-crypto crates: [`LocalWallet`] for v1 envelopes and [`JoseCrypto`]
//! for v2 ones.
use std::fmt;

use async_trait::async_trait;

use crate::{
    dids::DidDocument,
    messages::{EncryptedMessage, SignedMessage},
    Result,
};

#[cfg(feature = "raw-crypto")]
pub mod encryptor;
#[cfg(feature = "raw-crypto")]
pub mod jose;
#[cfg(feature = "raw-crypto")]
pub mod kdf;
#[cfg(feature = "raw-crypto")]
pub mod signer;
#[cfg(feature = "raw-crypto")]
pub mod wallet;

#[cfg(feature = "raw-crypto")]
pub use {
    encryptor::CryptoAlgorithm, jose::JoseCrypto, signer::SignatureAlgorithm, wallet::LocalWallet,
};

pub use crate::Error;

/// Return `Fn` signature definition for symmetric cryptography method.
/// Arguments sequence: Nonce, Key, Message, Additional authenticated data.
pub type SymmetricCypherMethod = Box<dyn Fn(&[u8], &[u8], &[u8], &[u8]) -> Result<Vec<u8>>>;

/// Return `Fn` signature definition for signature signing method.
/// .0 == `key: &[u8]`; .1 == `message`;
pub type SigningMethod = Box<dyn Fn(&[u8], &[u8]) -> Result<Vec<u8>>>;

/// Return `Fn` signature definition for signature validating method.
/// .0 == `key: &[u8]`; .1 == `message`; .2 == `signature`;
pub type ValidationMethod = Box<dyn Fn(&[u8], &[u8], &[u8]) -> Result<bool>>;

/// Trait must be implemented for pluggable cryptography.
/// Implemented by `CryptoAlgorithm` with `raw-crypto` feature.
pub trait Cypher {
    fn encryptor(&self) -> SymmetricCypherMethod;
    fn decryptor(&self) -> SymmetricCypherMethod;
}

/// Trait must be implemented for pluggable signatures.
/// Implemented by `SignatureAlgorithm` with `raw-crypto` feature.
pub trait Signer {
    fn signer(&self) -> SigningMethod;
    fn validator(&self) -> ValidationMethod;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    /// Key agreement key.
    X25519,
    /// Signing key (32 byte seed).
    Ed25519,
}

/// Private key material addressed by a key id.
#[derive(Clone)]
pub struct Secret {
    pub id: String,
    pub kind: SecretKind,
    pub private_key: Vec<u8>,
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Secret {
    pub fn x25519(kid: &str, private_key: [u8; 32]) -> Self {
        Secret {
            id: kid.into(),
            kind: SecretKind::X25519,
            private_key: private_key.to_vec(),
        }
    }

    pub fn ed25519(kid: &str, seed: [u8; 32]) -> Self {
        Secret {
            id: kid.into(),
            kind: SecretKind::Ed25519,
            private_key: seed.to_vec(),
        }
    }
}

/// Result of a v1 unpack: plaintext plus the raw keys involved.
#[derive(Debug, Clone)]
pub struct UnpackedMessage {
    pub plaintext: Vec<u8>,
    /// Absent for anonymous encryption.
    pub sender_key: Option<String>,
    pub recipient_key: String,
}

/// Wallet side of the pipeline: v1 pack/unpack, signatures and key custody.
///
/// Keys are base58 verkeys. Unpack failures caused by wrong keys or
/// tampering must both surface as `Error::DecryptionFailed`.
#[async_trait]
pub trait CryptoProvider: Send + Sync {
    async fn sign(&self, data: &[u8], verkey: &str) -> Result<Vec<u8>>;
    async fn verify(&self, data: &[u8], signature: &[u8], verkey: &str) -> Result<bool>;
    /// Authenticated encryption when `sender_key` is set, anonymous otherwise.
    async fn pack(
        &self,
        payload: &[u8],
        recipient_keys: &[String],
        sender_key: Option<&str>,
    ) -> Result<EncryptedMessage>;
    async fn unpack(&self, envelope: &EncryptedMessage) -> Result<UnpackedMessage>;
    /// Private key material held for `kid`, if any.
    async fn retrieve_secret(&self, kid: &str) -> Result<Option<Secret>>;
}

/// DID resolution as required by the v2 JOSE provider.
#[async_trait]
pub trait DidResolver: Send + Sync {
    async fn resolve(&self, did: &str) -> Result<Option<DidDocument>>;
}

/// Secret lookup as required by the v2 JOSE provider.
#[async_trait]
pub trait SecretsResolver: Send + Sync {
    async fn get_secret(&self, kid: &str) -> Result<Option<Secret>>;
    /// First of `kids`, in input order, held locally.
    async fn find_secret(&self, kids: &[String]) -> Result<Option<String>>;
}

/// Decrypted v2 envelope.
#[derive(Debug, Clone)]
pub struct JoseDecrypted {
    pub plaintext: Vec<u8>,
    /// Sender key id, absent for anonymous encryption.
    pub sender_kid: Option<String>,
}

/// JOSE provider for DIDComm v2 encrypted and signed envelopes.
#[async_trait]
pub trait JoseProvider: Send + Sync {
    /// Encrypts to every key id in `to`. Sender authenticated if `from` is set.
    async fn encrypt(
        &self,
        payload: &[u8],
        to: &[String],
        from: Option<&str>,
        dids: &dyn DidResolver,
        secrets: &dyn SecretsResolver,
    ) -> Result<EncryptedMessage>;
    /// Decrypts the key wrapped for `recipient_kid`.
    async fn decrypt(
        &self,
        envelope: &EncryptedMessage,
        recipient_kid: &str,
        dids: &dyn DidResolver,
        secrets: &dyn SecretsResolver,
    ) -> Result<JoseDecrypted>;
    async fn sign(
        &self,
        payload: &[u8],
        signer_kid: &str,
        secrets: &dyn SecretsResolver,
    ) -> Result<SignedMessage>;
    /// Verifies the signature and returns payload and signer key id.
    async fn verify(
        &self,
        message: &SignedMessage,
        dids: &dyn DidResolver,
    ) -> Result<(Vec<u8>, String)>;
}
