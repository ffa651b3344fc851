use std::sync::Arc;

use super::{
    context::{InboundMessageContext, OutboundMessage},
    correlator::ConnectionCorrelator,
    dispatcher::Dispatcher,
    resolver::MessageResolver,
    sender::MessageSender,
};
use crate::{
    connections::ConnectionRecord,
    envelope::{DecryptedMessageContext, EnvelopeKeys, EnvelopeService},
    messages::{
        is_problem_report, parse_failure_report, EncryptedMessage, InboundPayload,
        PlaintextMessage, SignedMessage,
    },
    transport::{SessionRecord, SessionRegistry, TransportSession},
    Error, Result,
};

/// Inbound pipeline: classify, unpack, correlate, resolve, dispatch.
pub struct MessageReceiver {
    envelopes: Arc<EnvelopeService>,
    correlator: ConnectionCorrelator,
    resolver: MessageResolver,
    dispatcher: Dispatcher,
    sessions: Arc<SessionRegistry>,
    sender: Arc<MessageSender>,
}

impl MessageReceiver {
    pub fn new(
        envelopes: Arc<EnvelopeService>,
        correlator: ConnectionCorrelator,
        resolver: MessageResolver,
        dispatcher: Dispatcher,
        sessions: Arc<SessionRegistry>,
        sender: Arc<MessageSender>,
    ) -> Self {
        MessageReceiver {
            envelopes,
            correlator,
            resolver,
            dispatcher,
            sessions,
            sender,
        }
    }

    /// `connection` is only used for plaintext input, encrypted input is
    /// always correlated from its keys.
    pub async fn receive(
        &self,
        raw: &[u8],
        session: Option<Arc<dyn TransportSession>>,
        connection: Option<ConnectionRecord>,
    ) -> Result<Option<OutboundMessage>> {
        match InboundPayload::classify(raw)? {
            InboundPayload::Encrypted(envelope) => self.receive_encrypted(&envelope, session).await,
            InboundPayload::Signed(signed) => self.receive_signed(&signed, session).await,
            InboundPayload::Plaintext(plaintext) => {
                self.receive_plaintext(plaintext, session, connection).await
            }
        }
    }

    async fn receive_encrypted(
        &self,
        envelope: &EncryptedMessage,
        session: Option<Arc<dyn TransportSession>>,
    ) -> Result<Option<OutboundMessage>> {
        let DecryptedMessageContext {
            plaintext_message,
            sender_key,
            recipient_key,
        } = self.envelopes.unpack(envelope).await?;
        info!(
            "received message of type {} for recipient {} from {}",
            plaintext_message.message_type().unwrap_or("<none>"),
            recipient_key.as_deref().unwrap_or("<unknown>"),
            sender_key.as_deref().unwrap_or("<anonymous>")
        );

        let connection = match (sender_key.as_deref(), recipient_key.as_deref()) {
            (Some(sender), Some(recipient)) => self.correlator.correlate(sender, recipient).await?,
            _ => None,
        };

        let (version, message) = match self.resolver.resolve(plaintext_message.clone()) {
            Ok(resolved) => resolved,
            Err(e) => return Err(self.report_failure(e, &plaintext_message, connection.as_ref()).await),
        };

        let mut context = InboundMessageContext::new(message, version);
        context.connection = connection.filter(ConnectionRecord::is_ready);
        context.sender_key = sender_key;
        context.recipient_key = recipient_key;

        self.handle_session(&mut context, session).await;
        self.dispatcher.dispatch(&context).await
    }

    async fn receive_signed(
        &self,
        signed: &SignedMessage,
        session: Option<Arc<dyn TransportSession>>,
    ) -> Result<Option<OutboundMessage>> {
        let decrypted = self.envelopes.unpack_signed(signed).await?;
        info!(
            "received signed message of type {} from {}",
            decrypted.plaintext_message.message_type().unwrap_or("<none>"),
            decrypted.sender_key.as_deref().unwrap_or("<unknown>")
        );
        let (version, message) = self.resolver.resolve(decrypted.plaintext_message)?;
        let mut context = InboundMessageContext::new(message, version);
        context.sender_key = decrypted.sender_key;
        self.handle_session(&mut context, session).await;
        self.dispatcher.dispatch(&context).await
    }

    async fn receive_plaintext(
        &self,
        plaintext: PlaintextMessage,
        session: Option<Arc<dyn TransportSession>>,
        connection: Option<ConnectionRecord>,
    ) -> Result<Option<OutboundMessage>> {
        info!(
            "received plaintext message of type {}",
            plaintext.message_type().unwrap_or("<none>")
        );
        let (version, message) = match self.resolver.resolve(plaintext.clone()) {
            Ok(resolved) => resolved,
            Err(e) => return Err(self.report_failure(e, &plaintext, connection.as_ref()).await),
        };
        let mut context = InboundMessageContext::new(message, version);
        context.connection = connection;
        self.handle_session(&mut context, session).await;
        self.dispatcher.dispatch(&context).await
    }

    /// Saves a session when the message asks for return routing and both
    /// keys of the envelope are known, otherwise closes the transport
    /// session. Signed and plaintext input never has both keys.
    async fn handle_session(
        &self,
        context: &mut InboundMessageContext,
        session: Option<Arc<dyn TransportSession>>,
    ) {
        let session = match session {
            Some(session) => session,
            None => return,
        };
        match (&context.sender_key, &context.recipient_key) {
            (Some(sender), Some(recipient)) if context.message.has_any_return_route() => {
                let record = SessionRecord {
                    session: session.clone(),
                    keys: EnvelopeKeys {
                        recipient_keys: vec![sender.clone()],
                        routing_keys: vec![],
                        sender_key: Some(recipient.clone()),
                    },
                    inbound_message: context.message.clone(),
                    connection: context.connection.clone(),
                };
                self.sessions.save(record).await;
                context.session_id = Some(session.id().to_string());
            }
            _ => {
                if let Err(e) = session.close().await {
                    warn!("closing {} session {} failed: {}", session.kind(), session.id(), e);
                }
            }
        }
    }

    /// Replies with a problem report to validation failures of messages
    /// with an id from a correlated relationship. Returns the error to raise.
    async fn report_failure(
        &self,
        error: Error,
        plaintext: &PlaintextMessage,
        connection: Option<&ConnectionRecord>,
    ) -> Error {
        let message_type = match &error {
            Error::MessageValidation { message_type, .. } => message_type.clone(),
            _ => return error,
        };
        let (connection, message_id) = match (connection, plaintext.id()) {
            (Some(connection), Some(id)) => (connection, id),
            _ => return error,
        };
        if is_problem_report(&message_type) {
            warn!("not answering invalid problem report {} with another one", message_id);
            return Error::ProblemReportLoop(message_id.into());
        }

        let version = plaintext.version().unwrap_or_default();
        let description = format!(
            "Error parsing message with type '{}' and id '{}': {}",
            message_type, message_id, error
        );
        let report = match parse_failure_report(version, &description, message_id) {
            Ok(report) => report,
            Err(e) => {
                error!("unable to build problem report for {}: {}", message_id, e);
                return error;
            }
        };
        let outbound = OutboundMessage::new(report, connection.clone()).with_version(version);
        if let Err(e) = self.sender.send_message(&outbound).await {
            error!("unable to send problem report for {}: {}", message_id, e);
        }
        error
    }
}
