//! Message type URIs: parsing, compatibility and legacy prefix rewriting.
use std::{fmt, str::FromStr};

use regex::Regex;

use crate::{Error, Result};

/// Legacy Aries message type prefix.
pub const LEGACY_DID_SOV_PREFIX: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec";
/// Canonical DIDComm message type prefix.
pub const DIDCOMM_PREFIX: &str = "https://didcomm.org";

lazy_static! {
    static ref MESSAGE_TYPE_RE: Regex =
        Regex::new(r"^(.+)/([^/\\]+)/(\d+)\.(\d+)/([^/\\]+)$").unwrap();
}

/// Rewrites `did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/...` to `https://didcomm.org/...`.
/// Other values are returned unchanged.
pub fn replace_legacy_did_sov_prefix(message_type: &str) -> String {
    match message_type.strip_prefix(LEGACY_DID_SOV_PREFIX) {
        Some(rest) => format!("{}{}", DIDCOMM_PREFIX, rest),
        None => message_type.to_string(),
    }
}

/// Rewrites `https://didcomm.org/...` back to the legacy prefix.
pub fn replace_new_did_comm_prefix_with_legacy(message_type: &str) -> String {
    match message_type.strip_prefix(DIDCOMM_PREFIX) {
        Some(rest) => format!("{}{}", LEGACY_DID_SOV_PREFIX, rest),
        None => message_type.to_string(),
    }
}

/// Components of a message type URI such as
/// `https://didcomm.org/connections/1.0/request`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedMessageType {
    /// `https://didcomm.org`
    pub document_uri: String,
    /// `connections`
    pub protocol_name: String,
    pub protocol_major_version: u32,
    pub protocol_minor_version: u32,
    /// `request`
    pub message_name: String,
    /// `https://didcomm.org/connections/1.0`
    pub protocol_uri: String,
    /// The full URI.
    pub message_type_uri: String,
}

impl ParsedMessageType {
    /// Whether a handler registered for `self` accepts `incoming`.
    ///
    /// Minor versions may differ, everything else must match.
    pub fn can_handle(&self, incoming: &ParsedMessageType) -> bool {
        self.document_uri == incoming.document_uri
            && self.protocol_name == incoming.protocol_name
            && self.protocol_major_version == incoming.protocol_major_version
            && self.message_name == incoming.message_name
    }

    pub fn protocol_version(&self) -> String {
        format!(
            "{}.{}",
            self.protocol_major_version, self.protocol_minor_version
        )
    }
}

impl FromStr for ParsedMessageType {
    type Err = Error;

    fn from_str(message_type: &str) -> Result<Self> {
        let captures = MESSAGE_TYPE_RE
            .captures(message_type)
            .ok_or_else(|| Error::InvalidMessageType(message_type.into()))?;
        let group = |i: usize| captures.get(i).map(|m| m.as_str()).unwrap_or_default();
        let version = |i: usize| {
            group(i)
                .parse::<u32>()
                .map_err(|_| Error::InvalidMessageType(message_type.into()))
        };
        let parsed = ParsedMessageType {
            document_uri: group(1).into(),
            protocol_name: group(2).into(),
            protocol_major_version: version(3)?,
            protocol_minor_version: version(4)?,
            message_name: group(5).into(),
            protocol_uri: String::new(),
            message_type_uri: message_type.into(),
        };
        Ok(ParsedMessageType {
            protocol_uri: format!(
                "{}/{}/{}",
                parsed.document_uri,
                parsed.protocol_name,
                parsed.protocol_version()
            ),
            ..parsed
        })
    }
}

impl fmt::Display for ParsedMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message_type_uri)
    }
}
