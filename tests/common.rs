#![allow(dead_code)]
extern crate didcomm_agent;

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    Mutex,
};
use utilities::KeyPair;

pub use didcomm_agent::{
    config::MessageForwardingStrategy,
    connections::{
        ConnectionRecord, ConnectionRepository, ConnectionRole, ConnectionState,
        InMemoryConnectionRepository,
    },
    crypto::{JoseCrypto, LocalWallet, Secret},
    dids::{DidCommService, DidDocument, DidRegistry, VerificationMethod},
    envelope::EnvelopeKeys,
    routing::{InMemoryMessageQueue, MessageQueue},
    messages::{
        AgentMessage, BasicMessage, Decorators, DidCommMessage, DidCommVersion, EncryptedMessage,
        ProblemReport, ReturnRoute, Thread,
    },
    transport::{OutboundPackage, OutboundTransport, TransportSession},
    Agent, AgentConfig, Error, InboundMessageContext, MessageHandler, OutboundMessage, Result,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Outbound transport handing every package to the test through a channel.
pub struct ChannelTransport {
    schemes: Vec<String>,
    packages: UnboundedSender<OutboundPackage>,
}

impl ChannelTransport {
    pub fn new(schemes: &[&str]) -> (Arc<Self>, UnboundedReceiver<OutboundPackage>) {
        let (packages, outbox) = mpsc::unbounded_channel();
        let transport = ChannelTransport {
            schemes: schemes.iter().map(|s| s.to_string()).collect(),
            packages,
        };
        (Arc::new(transport), outbox)
    }
}

#[async_trait]
impl OutboundTransport for ChannelTransport {
    fn supported_schemes(&self) -> Vec<String> {
        self.schemes.clone()
    }

    async fn send(&self, package: OutboundPackage) -> Result<()> {
        self.packages
            .send(package)
            .map_err(|e| Error::Transport(e.to_string()))
    }
}

/// Reply capable session remembering what was sent over it.
pub struct RecordingSession {
    id: String,
    pub sent: Mutex<Vec<OutboundPackage>>,
    closed: AtomicBool,
}

impl RecordingSession {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(RecordingSession {
            id: id.into(),
            sent: Mutex::new(vec![]),
            closed: AtomicBool::new(false),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub fn session_of(session: &Arc<RecordingSession>) -> Option<Arc<dyn TransportSession>> {
    let session: Arc<dyn TransportSession> = session.clone();
    Some(session)
}

#[async_trait]
impl TransportSession for RecordingSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        "recording"
    }

    async fn send(&self, package: OutboundPackage) -> Result<()> {
        self.sent.lock().await.push(package);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub type Recorded<M> = Arc<Mutex<Vec<(M, InboundMessageContext)>>>;

/// Remembers every message of type `M` it is given.
pub struct Recorder<M> {
    seen: Recorded<M>,
}

impl<M> Recorder<M> {
    pub fn new(seen: Recorded<M>) -> Self {
        Recorder { seen }
    }
}

#[async_trait]
impl<M: DidCommMessage + Clone> MessageHandler<M> for Recorder<M> {
    async fn handle(&self, message: &M, context: &InboundMessageContext) -> Result<Option<OutboundMessage>> {
        self.seen.lock().await.push((message.clone(), context.clone()));
        Ok(None)
    }
}

/// Answers every basic message with `pong: <content>` on the same thread.
pub struct Echo {
    seen: Recorded<BasicMessage>,
}

#[async_trait]
impl MessageHandler<BasicMessage> for Echo {
    async fn handle(
        &self,
        message: &BasicMessage,
        context: &InboundMessageContext,
    ) -> Result<Option<OutboundMessage>> {
        self.seen.lock().await.push((message.clone(), context.clone()));
        let mut reply = BasicMessage::new(&format!("pong: {}", message.content));
        reply.decorators = Decorators::default().with_thread(Thread::implicit_reply(&message.id));
        Ok(Some(OutboundMessage::reply(AgentMessage::new(reply)?, context)?))
    }
}

#[derive(Default)]
pub struct PartyOptions {
    pub mediator: bool,
    pub echo: bool,
    pub strategy: MessageForwardingStrategy,
    pub queue: Option<Arc<InMemoryMessageQueue>>,
}

/// One agent with its own wallet, identities and relationships.
pub struct Party {
    pub label: &'static str,
    pub did: String,
    pub verkey: String,
    pub endpoint: String,
    pub wallet: Arc<LocalWallet>,
    pub identities: Arc<DidRegistry>,
    pub connections: Arc<InMemoryConnectionRepository>,
    pub basic_messages: Recorded<BasicMessage>,
    pub problem_reports: Recorded<ProblemReport>,
    pub agent: Agent,
    outbox: Mutex<UnboundedReceiver<OutboundPackage>>,
}

pub async fn party(label: &'static str, keypair: KeyPair, options: PartyOptions) -> Party {
    let wallet = Arc::new(LocalWallet::new());
    let verkey = wallet.create_key(Some(keypair.private)).await.unwrap();
    assert_eq!(verkey, keypair.verkey());
    let identities = Arc::new(DidRegistry::new());
    let connections = Arc::new(InMemoryConnectionRepository::new());
    let (transport, outbox) = ChannelTransport::new(&["https"]);
    let basic_messages = Recorded::default();
    let problem_reports = Recorded::default();

    let mut config = AgentConfig::new(label);
    config.forwarding_strategy = options.strategy;
    let mut builder = Agent::builder(
        config,
        wallet.clone(),
        Arc::new(JoseCrypto::default()),
        identities.clone(),
        connections.clone(),
    )
    .transport(transport)
    .handler::<ProblemReport, _>(Recorder::new(problem_reports.clone()));
    builder = if options.echo {
        builder.handler::<BasicMessage, _>(Echo {
            seen: basic_messages.clone(),
        })
    } else {
        builder.handler::<BasicMessage, _>(Recorder::new(basic_messages.clone()))
    };
    if let Some(queue) = options.queue {
        builder = builder.queue(queue);
    }
    if options.mediator {
        builder = builder.mediator();
    }

    let party = Party {
        label,
        did: format!("did:example:{}", label),
        verkey,
        endpoint: format!("https://{}.example/didcomm", label),
        wallet,
        identities,
        connections,
        basic_messages,
        problem_reports,
        agent: builder.build().unwrap(),
        outbox: Mutex::new(outbox),
    };
    party.identities.register_ours(party.document()).await;
    party
}

impl Party {
    /// DID document reachable directly at this party's endpoint.
    pub fn document(&self) -> DidDocument {
        self.document_routed(&[])
    }

    /// DID document reachable through `hops`, innermost relay first.
    pub fn document_routed(&self, hops: &[&Party]) -> DidDocument {
        let endpoint = hops.last().map_or(&self.endpoint, |outermost| &outermost.endpoint);
        let mut document = DidDocument::new(&self.did);
        document.service = vec![DidCommService::new(
            &format!("{}#didcomm", self.did),
            endpoint,
            vec![self.verkey.clone()],
            hops.iter().map(|hop| hop.verkey.clone()).collect(),
        )];
        document
    }

    /// Next package this party's transport was asked to deliver.
    pub async fn next_package(&self) -> OutboundPackage {
        let mut outbox = self.outbox.lock().await;
        tokio::time::timeout(Duration::from_secs(5), outbox.recv())
            .await
            .expect("no package within 5s")
            .expect("transport closed")
    }

    pub async fn outbox_is_empty(&self) -> bool {
        self.outbox.lock().await.try_recv().is_err()
    }

    /// Hands a package to this party as its inbound transport would.
    pub async fn deliver(
        &self,
        package: &OutboundPackage,
        session: Option<Arc<dyn TransportSession>>,
    ) -> Result<Option<OutboundMessage>> {
        let raw = serde_json::to_vec(&package.payload)?;
        self.agent.receive(&raw, session, None).await
    }

    /// Authcrypts `message` from this party to `to`, as a peer agent would.
    pub async fn pack_for(&self, message: &AgentMessage, to: &Party) -> EncryptedMessage {
        let keys = EnvelopeKeys {
            recipient_keys: vec![to.verkey.clone()],
            routing_keys: vec![],
            sender_key: Some(self.verkey.clone()),
        };
        self.agent.pack(message, DidCommVersion::V1, &keys).await.unwrap()
    }
}

/// Completes a relationship between `a` and `b`, each side knowing the
/// other's DID document. Returns `(a's record, b's record)`.
pub async fn connect(a: &Party, b: &Party) -> (ConnectionRecord, ConnectionRecord) {
    let a_side = connection(a, b, ConnectionRole::Initiator).await;
    let b_side = connection(b, a, ConnectionRole::Responder).await;
    (a_side, b_side)
}

async fn connection(ours: &Party, theirs: &Party, role: ConnectionRole) -> ConnectionRecord {
    let record = ConnectionRecord::new(role, &ours.did, &ours.verkey)
        .with_their_did(&theirs.did)
        .with_their_key(&theirs.verkey)
        .unwrap()
        .with_state(ConnectionState::Complete);
    ours.connections.save(record.clone()).await.unwrap();
    ours.identities.register_theirs(theirs.document()).await;
    record
}

/// A v2 agent addressed by DID URL key ids.
pub struct V2Party {
    pub did: String,
    pub agreement_kid: String,
    pub signing_kid: String,
    pub endpoint: String,
    pub identities: Arc<DidRegistry>,
    pub connections: Arc<InMemoryConnectionRepository>,
    pub document: DidDocument,
    pub basic_messages: Recorded<BasicMessage>,
    pub agent: Agent,
    outbox: Mutex<UnboundedReceiver<OutboundPackage>>,
}

pub async fn v2_party(label: &str, agreement: KeyPair, seed: [u8; 32], mediator: bool) -> V2Party {
    let did = format!("did:example:{}", label);
    let agreement_kid = format!("{}#key-x25519-1", did);
    let signing_kid = format!("{}#key-ed25519-1", did);
    let endpoint = format!("https://{}.example/didcomm/v2", label);
    let wallet = Arc::new(LocalWallet::new());
    wallet.import_secret(Secret::x25519(&agreement_kid, agreement.private)).await;
    wallet.import_secret(Secret::ed25519(&signing_kid, seed)).await;
    let signing_verkey = wallet.create_signing_key(Some(seed)).await.unwrap();

    let mut document = DidDocument::new(&did);
    document.verification_method = vec![
        VerificationMethod {
            id: agreement_kid.clone(),
            kind: "X25519KeyAgreementKey2019".into(),
            controller: did.clone(),
            public_key_base58: agreement.verkey(),
        },
        VerificationMethod {
            id: signing_kid.clone(),
            kind: "Ed25519VerificationKey2018".into(),
            controller: did.clone(),
            public_key_base58: signing_verkey,
        },
    ];
    document.key_agreement = vec![agreement_kid.clone()];
    document.authentication = vec![signing_kid.clone()];
    document.service = vec![DidCommService::new(
        &format!("{}#didcomm-1", did),
        &endpoint,
        vec![agreement_kid.clone()],
        vec![],
    )];

    let identities = Arc::new(DidRegistry::new());
    identities.register_ours(document.clone()).await;
    let connections = Arc::new(InMemoryConnectionRepository::new());
    let (transport, outbox) = ChannelTransport::new(&["https"]);
    let basic_messages = Recorded::default();
    let mut builder = Agent::builder(
        AgentConfig::new(label),
        wallet,
        Arc::new(JoseCrypto::default()),
        identities.clone(),
        connections.clone(),
    )
    .transport(transport)
    .handler::<BasicMessage, _>(Recorder::new(basic_messages.clone()));
    if mediator {
        builder = builder.mediator();
    }

    V2Party {
        did,
        agreement_kid,
        signing_kid,
        endpoint,
        identities,
        connections,
        document,
        basic_messages,
        agent: builder.build().unwrap(),
        outbox: Mutex::new(outbox),
    }
}

impl V2Party {
    /// DID document reachable through `hops`, innermost relay first.
    pub fn document_routed(&self, hops: &[&V2Party]) -> DidDocument {
        let mut document = self.document.clone();
        let endpoint = hops.last().map_or(&self.endpoint, |outermost| &outermost.endpoint);
        document.service = vec![DidCommService::new(
            &format!("{}#didcomm-1", self.did),
            endpoint,
            vec![self.agreement_kid.clone()],
            hops.iter().map(|hop| hop.agreement_kid.clone()).collect(),
        )];
        document
    }

    pub async fn next_package(&self) -> OutboundPackage {
        let mut outbox = self.outbox.lock().await;
        tokio::time::timeout(Duration::from_secs(5), outbox.recv())
            .await
            .expect("no package within 5s")
            .expect("transport closed")
    }

    pub async fn deliver(&self, package: &OutboundPackage) -> Result<Option<OutboundMessage>> {
        let raw = serde_json::to_vec(&package.payload)?;
        self.agent.receive(&raw, None, None).await
    }
}

/// Completes a v2 relationship from `ours` to `theirs`, registering the
/// peer's DID document.
pub async fn connect_v2(ours: &V2Party, theirs: &V2Party) -> ConnectionRecord {
    let record = ConnectionRecord::new(ConnectionRole::Initiator, &ours.did, &ours.agreement_kid)
        .with_their_did(&theirs.did)
        .with_their_key(&theirs.agreement_kid)
        .unwrap()
        .with_version(DidCommVersion::V2)
        .with_state(ConnectionState::Complete);
    ours.connections.save(record.clone()).await.unwrap();
    ours.identities.register_theirs(theirs.document.clone()).await;
    record
}
