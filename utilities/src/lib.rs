use arrayref::array_ref;
use base58::{FromBase58, ToBase58};
use x25519_dalek::{PublicKey, StaticSecret};

/// X25519 key pair used by the test agents.
#[derive(Clone, Copy, Debug)]
pub struct KeyPair {
    pub public: [u8; 32],
    pub private: [u8; 32],
}

impl KeyPair {
    fn from_secret(secret: StaticSecret) -> Self {
        let public: PublicKey = (&secret).into();
        KeyPair {
            public: public.to_bytes(),
            private: secret.to_bytes(),
        }
    }

    /// Base58 encoded public key, as used for DIDComm v1 verkeys.
    pub fn verkey(&self) -> String {
        self.public.to_base58()
    }
}

pub struct KeyPairSet {
    pub alice: KeyPair,
    pub bob: KeyPair,
    pub mediator: KeyPair,
    pub relay: KeyPair,
}

pub fn get_keypair_set() -> KeyPairSet {
    let alice_private = "6QN8DfuN9hjgHgPvLXqgzqYE3jRRGRrmJQZkd5tL8paR".from_base58().unwrap();
    let bobs_private = "HBTcN2MrXNRj9xF9oi8QqYyuEPv3JLLjQKuEgW9oxVKP".from_base58().unwrap();

    KeyPairSet {
        alice: KeyPair::from_secret(StaticSecret::from(array_ref!(alice_private, 0, 32).to_owned())),
        bob: KeyPair::from_secret(StaticSecret::from(array_ref!(bobs_private, 0, 32).to_owned())),
        mediator: keypair_from_seed(0x4d),
        relay: keypair_from_seed(0x52),
    }
}

/// Deterministic key pair for tests that need more parties than the fixed set.
pub fn keypair_from_seed(seed: u8) -> KeyPair {
    let mut bytes = [seed; 32];
    bytes[31] = seed.wrapping_mul(7);
    KeyPair::from_secret(StaticSecret::from(bytes))
}

/// Ed25519 signing seed for DIDComm v2 signed envelopes.
pub fn signing_seed(seed: u8) -> [u8; 32] {
    let mut bytes = [seed; 32];
    bytes[0] = 0x5e;
    bytes
}
