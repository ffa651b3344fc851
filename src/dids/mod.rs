//! DID documents and the key/identity resolver contract.
use std::collections::HashMap;

use async_trait::async_trait;
use base58::FromBase58;
use regex::Regex;
use tokio::sync::RwLock;

use crate::{Error, Result};

lazy_static! {
    static ref DID_URL_RE: Regex = Regex::new(
        r"(?x)
        ^
        (?P<did>
            did             # scheme
            :
            [a-z0-9]+       # method
            :
            (?:[a-zA-Z0-9._%-]*:)*  # optional subdomains, postfixed with a ':'
            [a-zA-Z0-9._%-]+        # method specific identifier
        )
        (?:/[^?\#]*)?        # optional path
        (?:\?[^\#]*)?        # optional query
        (?:\#.*)?            # optional fragment
        $
    "
    )
    .unwrap();
}

/// Extracts key did part from a did url (drops path, query, and segment).
pub fn did_from_did_url(url: &str) -> Option<&str> {
    DID_URL_RE
        .captures(url)
        .and_then(|c| c.name("did"))
        .map(|m| m.as_str())
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub controller: String,
    pub public_key_base58: String,
}

impl VerificationMethod {
    pub fn public_key(&self) -> Result<Vec<u8>> {
        self.public_key_base58
            .from_base58()
            .map_err(|_| Error::BadKey(format!("invalid base58 key in {}", self.id)))
    }
}

/// DIDComm service block of a DID document (or an inline service).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DidCommService {
    pub id: String,
    #[serde(rename = "type", default = "default_service_type")]
    pub kind: String,
    pub service_endpoint: String,
    #[serde(default)]
    pub recipient_keys: Vec<String>,
    #[serde(default)]
    pub routing_keys: Vec<String>,
    #[serde(default)]
    pub priority: u32,
}

fn default_service_type() -> String {
    "did-communication".into()
}

impl DidCommService {
    pub fn new(id: &str, endpoint: &str, recipient_keys: Vec<String>, routing_keys: Vec<String>) -> Self {
        DidCommService {
            id: id.into(),
            kind: default_service_type(),
            service_endpoint: endpoint.into(),
            recipient_keys,
            routing_keys,
            priority: 0,
        }
    }

    /// URL scheme of the endpoint (`https`, `ws`, `didcomm` ...).
    pub fn protocol_scheme(&self) -> &str {
        self.service_endpoint
            .split(':')
            .next()
            .unwrap_or_default()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    pub id: String,
    #[serde(default)]
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default)]
    pub authentication: Vec<String>,
    #[serde(default)]
    pub key_agreement: Vec<String>,
    #[serde(default)]
    pub service: Vec<DidCommService>,
}

impl DidDocument {
    pub fn new(id: &str) -> Self {
        DidDocument {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn verification_method(&self, kid: &str) -> Option<&VerificationMethod> {
        self.verification_method.iter().find(|vm| vm.id == kid)
    }

    /// Raw public key bytes of the verification method `kid`.
    pub fn public_key(&self, kid: &str) -> Result<Vec<u8>> {
        self.verification_method(kid)
            .ok_or_else(|| Error::DidResolveFailed(kid.into()))?
            .public_key()
    }

    /// DIDComm services ordered by priority.
    pub fn didcomm_services(&self) -> Vec<DidCommService> {
        let mut services = self.service.clone();
        services.sort_by_key(|s| s.priority);
        services
    }

    /// Every key identifier this document controls: verification method ids,
    /// their base58 keys and the recipient keys of its services.
    fn keys(&self) -> Vec<String> {
        let mut keys = vec![];
        for vm in &self.verification_method {
            keys.push(vm.id.clone());
            keys.push(vm.public_key_base58.clone());
        }
        for service in &self.service {
            keys.extend(service.recipient_keys.iter().cloned());
        }
        keys
    }
}

/// Maps keys to owning identities and resolves DID documents.
///
/// "Ours" are identities this agent created, "theirs" are identities
/// received from peers.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Our DID owning `key` (base58 verkey or DID URL).
    async fn find_our_did(&self, key: &str) -> Result<Option<String>>;
    /// Peer DID owning `key` (base58 verkey or DID URL).
    async fn find_their_did(&self, key: &str) -> Result<Option<String>>;
    async fn resolve_did(&self, did: &str) -> Result<Option<DidDocument>>;
}

#[derive(Default)]
struct Registry {
    ours: HashMap<String, String>,
    theirs: HashMap<String, String>,
    documents: HashMap<String, DidDocument>,
}

/// In-memory [`IdentityResolver`].
#[derive(Default)]
pub struct DidRegistry {
    inner: RwLock<Registry>,
}

impl DidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_ours(&self, document: DidDocument) {
        let mut registry = self.inner.write().await;
        for key in document.keys() {
            registry.ours.insert(key, document.id.clone());
        }
        registry.documents.insert(document.id.clone(), document);
    }

    pub async fn register_theirs(&self, document: DidDocument) {
        let mut registry = self.inner.write().await;
        for key in document.keys() {
            registry.theirs.insert(key, document.id.clone());
        }
        registry.documents.insert(document.id.clone(), document);
    }

    /// Makes a document resolvable without claiming its keys.
    pub async fn publish(&self, document: DidDocument) {
        self.inner
            .write()
            .await
            .documents
            .insert(document.id.clone(), document);
    }
}

fn lookup(index: &HashMap<String, String>, key: &str) -> Option<String> {
    index.get(key).cloned().or_else(|| {
        let did = did_from_did_url(key)?;
        index.values().find(|owner| owner.as_str() == did).cloned()
    })
}

#[async_trait]
impl IdentityResolver for DidRegistry {
    async fn find_our_did(&self, key: &str) -> Result<Option<String>> {
        Ok(lookup(&self.inner.read().await.ours, key))
    }

    async fn find_their_did(&self, key: &str) -> Result<Option<String>> {
        Ok(lookup(&self.inner.read().await.theirs, key))
    }

    async fn resolve_did(&self, did: &str) -> Result<Option<DidDocument>> {
        let did = did_from_did_url(did).ok_or(Error::BadDid)?;
        Ok(self.inner.read().await.documents.get(did).cloned())
    }
}
