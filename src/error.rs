/// Coarse classification of [`Error`] values.
///
/// Mirrors the failure categories of the receive and relay pipeline so that
/// transports can decide how to react without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Structurally invalid envelope or plaintext, rejected before any crypto.
    MalformedInput,
    /// Decryption or signature verification failure.
    Cryptographic,
    /// Sender key conflicts with an established relationship.
    Authentication,
    /// No handler registered for the message type.
    UnknownType,
    /// Known message type with an invalid payload.
    Validation,
    /// Unrouted key or route ownership mismatch on a relay.
    Routing,
    /// Outbound delivery failure.
    Delivery,
    /// Storage, configuration and other local failures.
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to parse incoming message: unrecognized format")]
    UnrecognizedFormat,
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("malformed plaintext message: {0}")]
    MalformedMessage(String),
    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(String),
    #[error("invalid message type: {0}")]
    InvalidMessageType(String),
    #[error("unable to decrypt message")]
    DecryptionFailed,
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("plugged cryptography failure")]
    PlugCryptoFailure,
    #[error("malformed key: {0}")]
    BadKey(String),
    #[error("malformed DID string")]
    BadDid,
    #[error("unable to resolve {0}")]
    DidResolveFailed(String),
    #[error("sender key {sender} is not authorized for connection {connection_id}")]
    SenderNotAuthorized {
        sender: String,
        connection_id: String,
    },
    #[error("no handler registered for message type {0}")]
    NoHandler(String),
    #[error("error validating message {message_type}: {reason}")]
    MessageValidation {
        message_type: String,
        reason: String,
    },
    #[error("not sending problem report in response to problem report: {0}")]
    ProblemReportLoop(String),
    #[error("recipient key {0} is already routed")]
    DuplicateRoute(String),
    #[error("no route for recipient key {0}")]
    NoRoute(String),
    #[error("recipient key {key} is routed to connection {owner}, not {requested}")]
    RouteOwnershipMismatch {
        key: String,
        owner: String,
        requested: String,
    },
    #[error("connection {0} is not ready")]
    ConnectionNotReady(String),
    #[error("record not found: {0}")]
    RecordNotFound(String),
    #[error("record already exists: {0}")]
    RecordDuplicate(String),
    #[error("message is undeliverable: {0}")]
    Undeliverable(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("{0}")]
    Generic(String),
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    RegexError(#[from] regex::Error),
    #[cfg(feature = "raw-crypto")]
    #[error(transparent)]
    EdDsaError(#[from] ed25519_dalek::SignatureError),
    #[error(transparent)]
    StringConversionError(#[from] std::string::FromUtf8Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnrecognizedFormat
            | Error::MalformedEnvelope(_)
            | Error::MalformedMessage(_)
            | Error::UnsupportedVersion(_)
            | Error::InvalidMessageType(_)
            | Error::SerdeError(_)
            | Error::StringConversionError(_) => ErrorKind::MalformedInput,
            Error::DecryptionFailed
            | Error::InvalidSignature
            | Error::PlugCryptoFailure
            | Error::BadKey(_) => ErrorKind::Cryptographic,
            #[cfg(feature = "raw-crypto")]
            Error::EdDsaError(_) => ErrorKind::Cryptographic,
            Error::SenderNotAuthorized { .. } => ErrorKind::Authentication,
            Error::NoHandler(_) => ErrorKind::UnknownType,
            Error::MessageValidation { .. } | Error::ProblemReportLoop(_) => ErrorKind::Validation,
            Error::DuplicateRoute(_) | Error::NoRoute(_) | Error::RouteOwnershipMismatch { .. } => {
                ErrorKind::Routing
            }
            Error::Undeliverable(_) | Error::Transport(_) => ErrorKind::Delivery,
            Error::BadDid
            | Error::DidResolveFailed(_)
            | Error::ConnectionNotReady(_)
            | Error::RecordNotFound(_)
            | Error::RecordDuplicate(_)
            | Error::Generic(_)
            | Error::RegexError(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_covers_pipeline_failures() {
        assert_eq!(Error::DecryptionFailed.kind(), ErrorKind::Cryptographic);
        assert_eq!(
            Error::SenderNotAuthorized {
                sender: "k".into(),
                connection_id: "c".into()
            }
            .kind(),
            ErrorKind::Authentication
        );
        assert_eq!(Error::NoHandler("t".into()).kind(), ErrorKind::UnknownType);
        assert_eq!(Error::NoRoute("k".into()).kind(), ErrorKind::Routing);
        assert_eq!(Error::UnrecognizedFormat.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn decryption_failure_message_is_opaque() {
        assert_eq!(Error::DecryptionFailed.to_string(), "unable to decrypt message");
    }
}
