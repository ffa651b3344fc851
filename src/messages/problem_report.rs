use chrono::{DateTime, Utc};
use regex::Regex;

use super::{
    agent_message::generate_id,
    decorators::{Decorators, Thread},
    message_type::ParsedMessageType,
    plaintext::DidCommVersion,
};
use crate::{Error, Result};

pub const PROBLEM_REPORT: &str = "https://didcomm.org/notification/1.0/problem-report";
pub const PROBLEM_REPORT_V2: &str = "https://didcomm.org/report-problem/2.0/problem-report";

/// Problem code of a v1 report about an unparsable message.
pub const MESSAGE_PARSE_FAILURE: &str = "message-parse-failure";

lazy_static! {
    static ref PROBLEM_CODE_RE: Regex =
        Regex::new(r"^[ew]\.[a-z0-9\-]{1,32}(\.[a-zA-Z0-9\-]+)+$").unwrap();
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct DescriptionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub en: Option<String>,
    pub code: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FixHint {
    pub en: String,
}

/// `notification/1.0/problem-report`, Aries RFC 0035.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProblemReport {
    #[serde(rename = "@id")]
    pub id: String,
    pub description: DescriptionOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<FixHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noticed_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_uri: Option<String>,
    #[serde(flatten)]
    pub decorators: Decorators,
}

impl ProblemReport {
    pub fn new(code: &str, description: &str) -> Self {
        ProblemReport {
            id: generate_id(),
            description: DescriptionOptions {
                en: Some(description.into()),
                code: code.into(),
            },
            fix_hint: None,
            impact: None,
            location: None,
            noticed_time: Some(Utc::now()),
            tracking_uri: None,
            escalation_uri: None,
            decorators: Decorators::default(),
        }
    }

    /// Report about the message with id `pthid` that failed to parse.
    pub fn message_parse_failure(description: &str, pthid: &str) -> Self {
        let mut report = Self::new(MESSAGE_PARSE_FAILURE, description);
        report.decorators.thread = Some(Thread::child_of(pthid));
        report
    }

    fn check(&self) -> Result<()> {
        if self.description.code.is_empty() {
            return Err(Error::MessageValidation {
                message_type: PROBLEM_REPORT.into(),
                reason: "description.code must not be empty".into(),
            });
        }
        Ok(())
    }
}

crate::didcomm_message!(ProblemReport, PROBLEM_REPORT, legacy_prefix, validate = ProblemReport::check);

/// `report-problem/2.0/problem-report`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProblemReportV2 {
    #[serde(rename = "@id")]
    pub id: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalate_to: Option<String>,
    #[serde(flatten)]
    pub decorators: Decorators,
}

impl ProblemReportV2 {
    /// Parses given code into new report.
    /// If given string is not a DIDComm v2 problem code - returns Err.
    ///
    pub fn from_code(code: &str) -> Result<Self> {
        check_problem_code(code)?;
        Ok(ProblemReportV2 {
            id: generate_id(),
            code: code.into(),
            comment: None,
            args: vec![],
            escalate_to: None,
            decorators: Decorators::default(),
        })
    }

    /// Takes `KnownProblems` variant and creates new report using it as code.
    pub fn from_known_problem(problem: KnownProblems) -> Self {
        ProblemReportV2 {
            id: generate_id(),
            code: problem.code().into(),
            comment: None,
            args: vec![],
            escalate_to: None,
            decorators: Decorators::default(),
        }
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_parent(mut self, pthid: &str) -> Self {
        self.decorators.thread = Some(Thread::child_of(pthid));
        self
    }

    fn check(&self) -> Result<()> {
        check_problem_code(&self.code)
    }
}

crate::didcomm_message!(ProblemReportV2, PROBLEM_REPORT_V2, validate = ProblemReportV2::check);

fn check_problem_code(code: &str) -> Result<()> {
    if PROBLEM_CODE_RE.is_match(code) {
        Ok(())
    } else {
        Err(Error::MessageValidation {
            message_type: PROBLEM_REPORT_V2.into(),
            reason: format!("code {} badly formatted for this problem", code),
        })
    }
}

/// Values defined in spec: https://identity.foundation/didcomm-messaging/spec/#problem-codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownProblems {
    // Protocol Error section
    TrustError,
    CryptoTrustError,
    XferError,
    DidError,
    MsgError,
    MeError,
    MeResError,
    ReqError,
    ReqTimeError,
    LegalError,

    // Protocol warning section
    TrustWarning,
    XferWarning,
    MsgWarning,
}

impl KnownProblems {
    pub fn code(&self) -> &'static str {
        match self {
            KnownProblems::TrustError => "e.p.trust",
            KnownProblems::CryptoTrustError => "e.p.trust.crypto",
            KnownProblems::XferError => "e.p.xfer",
            KnownProblems::DidError => "e.p.did",
            KnownProblems::MsgError => "e.p.msg",
            KnownProblems::MeError => "e.p.me",
            KnownProblems::MeResError => "e.p.me.res",
            KnownProblems::ReqError => "e.p.req",
            KnownProblems::ReqTimeError => "e.p.req.time",
            KnownProblems::LegalError => "e.p.legal",
            KnownProblems::TrustWarning => "w.p.trust",
            KnownProblems::XferWarning => "w.p.xfer",
            KnownProblems::MsgWarning => "w.p.msg",
        }
    }
}

/// Whether `message_type` names a problem report of either version.
pub fn is_problem_report(message_type: &str) -> bool {
    let incoming: ParsedMessageType = match message_type.parse() {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };
    [PROBLEM_REPORT, PROBLEM_REPORT_V2].iter().any(|known| {
        known
            .parse::<ParsedMessageType>()
            .map(|registered| registered.can_handle(&incoming))
            .unwrap_or(false)
    })
}

/// Problem report about an unparsable message, in the shape of `version`.
pub fn parse_failure_report(
    version: DidCommVersion,
    description: &str,
    pthid: &str,
) -> Result<super::AgentMessage> {
    match version {
        DidCommVersion::V1 => {
            super::AgentMessage::new(ProblemReport::message_parse_failure(description, pthid))
        }
        DidCommVersion::V2 => super::AgentMessage::new(
            ProblemReportV2::from_known_problem(KnownProblems::MsgError)
                .with_comment(description)
                .with_parent(pthid),
        ),
    }
}
