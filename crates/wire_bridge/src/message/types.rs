//! Message type definitions for the bridge protocol.
//!
//! Every message shares a [`MessageHeader`]; the four kinds add their own
//! fields on top. On the wire a message is a single JSON document:
//!
//! ```json
//! {
//!   "type": "request",
//!   "id": "1700000000000-k3j9x0a1b",
//!   "op": "player.kick",
//!   "data": { "playerId": "abc" },
//!   "timestamp": "2023-11-14T22:13:20.123Z",
//!   "serverId": "survival-1",
//!   "version": "2.0",
//!   "timeout": 5000
//! }
//! ```

use super::operations::SystemOp;
use super::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Protocol version spoken by this engine.
pub const PROTOCOL_VERSION: &str = "2.0";

fn default_protocol_version() -> String {
    PROTOCOL_VERSION.to_string()
}

fn default_timestamp() -> DateTime<Utc> {
    crate::utils::now_millis()
}

/// Discriminant of the four message kinds (`type` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Event,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Request => "request",
            MessageKind::Response => "response",
            MessageKind::Event => "event",
            MessageKind::System => "system",
        }
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "request" => Ok(MessageKind::Request),
            "response" => Ok(MessageKind::Response),
            "event" => Ok(MessageKind::Event),
            "system" => Ok(MessageKind::System),
            other => Err(format!("unknown message type: {other}")),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields common to every message kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Unique message identifier
    pub id: String,

    /// Operation in `category.action` form (or a bare system operation)
    #[serde(rename = "op")]
    pub operation: String,

    /// Opaque structured payload
    #[serde(rename = "data", default)]
    pub payload: Value,

    /// Creation time, ISO-8601 on the wire
    #[serde(with = "timestamp", default = "default_timestamp")]
    pub timestamp: DateTime<Utc>,

    /// Origin or target server identifier
    #[serde(rename = "serverId", default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,

    /// Protocol version of the sender
    #[serde(rename = "version", default = "default_protocol_version")]
    pub protocol_version: String,
}

/// A message that expects exactly one [`Response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(flatten)]
    pub header: MessageHeader,

    /// Requested timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// The answer to a [`Request`], correlated through `request_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(flatten)]
    pub header: MessageHeader,

    #[serde(rename = "requestId")]
    pub request_id: String,

    pub success: bool,

    /// Present iff `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A fire-and-forget notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(flatten)]
    pub header: MessageHeader,

    #[serde(rename = "eventType")]
    pub event_type: String,
}

/// A connection-lifecycle message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    #[serde(flatten)]
    pub header: MessageHeader,

    #[serde(rename = "systemOp")]
    pub system_op: SystemOp,
}

/// Any bridge protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Request(Request),
    Response(Response),
    Event(Event),
    System(SystemMessage),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Request(_) => MessageKind::Request,
            Message::Response(_) => MessageKind::Response,
            Message::Event(_) => MessageKind::Event,
            Message::System(_) => MessageKind::System,
        }
    }

    pub fn header(&self) -> &MessageHeader {
        match self {
            Message::Request(m) => &m.header,
            Message::Response(m) => &m.header,
            Message::Event(m) => &m.header,
            Message::System(m) => &m.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut MessageHeader {
        match self {
            Message::Request(m) => &mut m.header,
            Message::Response(m) => &mut m.header,
            Message::Event(m) => &mut m.header,
            Message::System(m) => &mut m.header,
        }
    }

    pub fn id(&self) -> &str {
        &self.header().id
    }

    pub fn operation(&self) -> &str {
        &self.header().operation
    }

    pub fn payload(&self) -> &Value {
        &self.header().payload
    }

    pub fn server_id(&self) -> Option<&str> {
        self.header().server_id.as_deref()
    }

    /// Converts this message into its canonical wire document.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Builds a message from a wire document that already passed the type guards.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

impl From<Request> for Message {
    fn from(m: Request) -> Self {
        Message::Request(m)
    }
}

impl From<Response> for Message {
    fn from(m: Response) -> Self {
        Message::Response(m)
    }
}

impl From<Event> for Message {
    fn from(m: Event) -> Self {
        Message::Event(m)
    }
}

impl From<SystemMessage> for Message {
    fn from(m: SystemMessage) -> Self {
        Message::System(m)
    }
}
