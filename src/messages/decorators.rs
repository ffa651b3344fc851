//! Decorator Types.
//!
//! Decorators represent additional metadata that adds semantic
//! content relevant to messaging in general but not tied to a specific domain.
//! Every typed message flattens one [`Decorators`] set into its schema.
//! For more details, see Aries RFC 0011.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A `~thread` message decorator that provides request/reply
/// and threading semantics according to Aries RFC 0008.
#[derive(Default, Deserialize, Serialize, PartialEq, Debug, Clone)]
#[serde(default)]
pub struct Thread {
    /// The ID of the message that serves as the thread start.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub thid: String,

    /// An optional parent `thid`.
    ///
    /// It's used when branching or nesting a new interaction off an
    /// existing one.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pthid: String,

    /// The index of the message in the sequence of all the messages
    /// the current *sender* has contributed to in the thread.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_order: Option<usize>,

    /// A dictionary of sender_order/highest messages received on the thread.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_orders: Option<HashMap<String, usize>>,
}

impl Thread {
    /// Creates implicit thread.
    ///
    /// # Example
    ///
    /// ```
    /// use didcomm_agent::messages::Thread;
    /// let message_id = "new-message";
    /// let thread = Thread::implicit(&message_id);
    /// assert_eq!(thread.thid, message_id.to_string())
    /// ```
    pub fn implicit(message_id: &str) -> Self {
        Self {
            thid: message_id.into(),
            sender_order: Some(0),
            ..Default::default()
        }
    }

    /// Create implicit message reply thread.
    pub fn implicit_reply(thid: &str) -> Self {
        Self {
            thid: thid.into(),
            ..Default::default()
        }
    }

    /// Thread nested under `pthid`, as used by problem reports.
    pub fn child_of(pthid: &str) -> Self {
        Self {
            pthid: pthid.into(),
            ..Default::default()
        }
    }

    /// Creates an effective implicit message reply thread.
    pub fn effective_implicit_reply(thid: &str, sender: &str) -> Self {
        let mut thr = Self::implicit_reply(thid);
        thr.received_orders = Some(HashMap::from([(sender.into(), 0)]));
        thr
    }

    /// Returns `true` if the thread is for an implicit reply message.
    pub fn is_implicit_reply(&self, message_id: &str) -> bool {
        if self.thid != message_id {
            match self.received_orders {
                Some(ref recv_orders) => recv_orders.values().all(|&x| x == 0),
                None => true,
            }
        } else {
            false
        }
    }
}

/// Return route preference of the `~transport` decorator (Aries RFC 0092).
#[derive(Deserialize, Serialize, PartialEq, Eq, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ReturnRoute {
    None,
    All,
    Thread,
}

impl Default for ReturnRoute {
    fn default() -> Self {
        ReturnRoute::None
    }
}

#[derive(Default, Deserialize, Serialize, PartialEq, Debug, Clone)]
pub struct TransportDecorator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_route: Option<ReturnRoute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_route_thread: Option<String>,
}

/// `~timing` decorator.
#[derive(Default, Deserialize, Serialize, PartialEq, Debug, Clone)]
pub struct Timing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_milli: Option<u64>,
}

/// `~please_ack` decorator.
#[derive(Default, Deserialize, Serialize, PartialEq, Debug, Clone)]
pub struct PleaseAck {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on: Vec<String>,
}

/// All decorators a message may carry, each optional.
#[derive(Default, Deserialize, Serialize, PartialEq, Debug, Clone)]
pub struct Decorators {
    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<Thread>,
    #[serde(rename = "~transport", default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportDecorator>,
    #[serde(rename = "~timing", default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
    #[serde(rename = "~please_ack", default, skip_serializing_if = "Option::is_none")]
    pub please_ack: Option<PleaseAck>,
}

impl Decorators {
    pub fn with_thread(mut self, thread: Thread) -> Self {
        self.thread = Some(thread);
        self
    }

    pub fn with_return_route(mut self, return_route: ReturnRoute) -> Self {
        self.transport
            .get_or_insert_with(TransportDecorator::default)
            .return_route = Some(return_route);
        self
    }

    pub fn return_route(&self) -> ReturnRoute {
        self.transport
            .as_ref()
            .and_then(|t| t.return_route)
            .unwrap_or_default()
    }

    /// Thread id of the message: `~thread.thid` if set, the message id otherwise.
    pub fn thread_id<'a>(&'a self, message_id: &'a str) -> &'a str {
        match &self.thread {
            Some(thread) if !thread.thid.is_empty() => &thread.thid,
            _ => message_id,
        }
    }

    /// Whether the message asked for return routing of its replies.
    pub fn has_any_return_route(&self) -> bool {
        matches!(self.return_route(), ReturnRoute::All | ReturnRoute::Thread)
    }

    /// Whether a reply on thread `thid` may use the return route.
    ///
    /// `all` allows any reply. `thread` only replies on the decorated thread.
    pub fn has_return_routing(&self, message_id: &str, thid: Option<&str>) -> bool {
        match self.return_route() {
            ReturnRoute::All => true,
            ReturnRoute::Thread => {
                let routed_thread = self
                    .transport
                    .as_ref()
                    .and_then(|t| t.return_route_thread.as_deref())
                    .unwrap_or_else(|| self.thread_id(message_id));
                thid == Some(routed_thread)
            }
            ReturnRoute::None => false,
        }
    }
}
