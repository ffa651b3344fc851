//! Key agreement helpers shared by the bundled v1 and v2 providers.
use std::convert::TryFrom;

use arrayref::array_ref;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};

use super::{CryptoAlgorithm, Cypher};
use crate::Error;

const SEAL_NONCE_LEN: usize = 24;

/// Concatenates key derivation function (NIST SP 800-56A, single round).
///
/// # Arguments
///
/// * `secret` - shared secret `Z`
///
/// * `alg` - algorithm identifier mixed into the derivation
///
/// * `producer_info` - optional `PartyUInfo`
///
/// * `consumer_info` - optional `PartyVInfo`
pub fn concat_kdf(
    secret: &[u8],
    alg: &str,
    producer_info: Option<&[u8]>,
    consumer_info: Option<&[u8]>,
) -> Result<Vec<u8>, Error> {
    let mut value = get_length_and_input(alg.as_bytes())?;
    if let Some(vector) = producer_info {
        value.extend(get_length_and_input(vector)?);
    } else {
        value.extend(&[0, 0, 0, 0]);
    }
    if let Some(vector) = consumer_info {
        value.extend(get_length_and_input(vector)?);
    } else {
        value.extend(&[0, 0, 0, 0]);
    }
    // only key length 256 is supported
    value.extend(&[0, 0, 1, 0]);

    // since our key length is 256 we only have to do one round
    let mut to_hash: Vec<u8> = vec![0, 0, 0, 1];
    to_hash.extend(secret);
    to_hash.extend(value);

    let mut hasher = Sha256::new();
    hasher.input(&to_hash);
    Ok(hasher.result().as_slice().to_vec())
}

/// X25519 shared secret between a private and a public key.
pub fn diffie_hellman(private_key: &[u8], public_key: &[u8]) -> Result<[u8; 32], Error> {
    let private_key = to_key_bytes(private_key)?;
    let public_key = to_key_bytes(public_key)?;
    let shared = StaticSecret::from(private_key).diffie_hellman(&PublicKey::from(public_key));
    Ok(*shared.as_bytes())
}

/// Public key of an X25519 private key.
pub fn x25519_public_key(private_key: &[u8]) -> Result<[u8; 32], Error> {
    let secret = StaticSecret::from(to_key_bytes(private_key)?);
    Ok(PublicKey::from(&secret).to_bytes())
}

/// Creates a key used to encrypt/decrypt keys (key encryption key).
///
/// `ze` is the ephemeral-static secret, `zs` the optional static-static one
/// (present for sender authenticated modes).
pub fn generate_kek(ze: &[u8], zs: Option<&[u8]>, alg: &str) -> Result<Vec<u8>, Error> {
    let shared_secret = match zs {
        Some(zs) => [ze, zs].concat(),
        None => ze.to_vec(),
    };
    let kek = concat_kdf(&shared_secret, alg, None, None)?;
    trace!("derived key encryption key for {}", alg);
    Ok(kek)
}

/// Anonymously encrypts `message` to `recipient_public_key`.
///
/// Output layout: ephemeral public key (32) || nonce (24) || ciphertext and tag.
pub fn seal(message: &[u8], recipient_public_key: &[u8]) -> Result<Vec<u8>, Error> {
    let ephemeral = rand::random::<[u8; 32]>();
    let ephemeral_public = x25519_public_key(&ephemeral)?;
    let shared = diffie_hellman(&ephemeral, recipient_public_key)?;
    let key = concat_kdf(
        &shared,
        "Anoncrypt",
        Some(&ephemeral_public[..]),
        Some(recipient_public_key),
    )?;
    let nonce = CryptoAlgorithm::XC20P.generate_nonce();
    let sealed = CryptoAlgorithm::XC20P.encryptor()(&nonce, &key, message, &[])?;

    let mut out = Vec::with_capacity(32 + SEAL_NONCE_LEN + sealed.len());
    out.extend_from_slice(&ephemeral_public);
    out.extend_from_slice(&nonce);
    out.extend(sealed);
    Ok(out)
}

/// Opens a box produced by [`seal`] with the recipient key pair.
pub fn open(sealed: &[u8], recipient_private_key: &[u8]) -> Result<Vec<u8>, Error> {
    if sealed.len() < 32 + SEAL_NONCE_LEN + 16 {
        return Err(Error::DecryptionFailed);
    }
    let recipient_public_key = x25519_public_key(recipient_private_key)?;
    let ephemeral_public = &sealed[..32];
    let nonce = &sealed[32..32 + SEAL_NONCE_LEN];
    let shared = diffie_hellman(recipient_private_key, ephemeral_public)?;
    let key = concat_kdf(
        &shared,
        "Anoncrypt",
        Some(ephemeral_public),
        Some(&recipient_public_key[..]),
    )?;
    CryptoAlgorithm::XC20P.decryptor()(nonce, &key, &sealed[32 + SEAL_NONCE_LEN..], &[])
}

/// Combines length of array and its its length into a vector.
fn get_length_and_input(vector: &[u8]) -> Result<Vec<u8>, Error> {
    let mut collected: Vec<u8> = u32::try_from(vector.len())
        .map_err(|err| Error::Generic(err.to_string()))?
        .to_be_bytes()
        .to_vec();
    collected.extend(vector);
    Ok(collected)
}

fn to_key_bytes(key: &[u8]) -> Result<[u8; 32], Error> {
    if key.len() != 32 {
        return Err(Error::BadKey(format!("expected 32 byte key, got {}", key.len())));
    }
    Ok(array_ref!(key, 0, 32).to_owned())
}
