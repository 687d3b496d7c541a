//! Inbox message envelope and the five-type message taxonomy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// The closed set of message types agents exchange.
///
/// `Broadcast` is expanded at send time into one `Message` per non-sender
/// team member; the stored copies keep the `broadcast` tag so receivers can
/// distinguish fan-out traffic from direct mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Free-form inter-agent communication
    Message,
    /// Fan-out to every non-sender team member
    Broadcast,
    /// Ask the target to finalize and exit
    ShutdownRequest,
    /// Acknowledgement of a `ShutdownRequest`, echoing its request id
    ShutdownResponse,
    /// Reply in the plan-approval flow, echoing the proposal's request id
    PlanApprovalResponse,
}

impl MessageType {
    /// Whether this type carries a `request_id`.
    pub fn carries_request_id(self) -> bool {
        matches!(
            self,
            MessageType::ShutdownRequest
                | MessageType::ShutdownResponse
                | MessageType::PlanApprovalResponse
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Message => "message",
            MessageType::Broadcast => "broadcast",
            MessageType::ShutdownRequest => "shutdown_request",
            MessageType::ShutdownResponse => "shutdown_response",
            MessageType::PlanApprovalResponse => "plan_approval_response",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(MessageType::Message),
            "broadcast" => Ok(MessageType::Broadcast),
            "shutdown_request" => Ok(MessageType::ShutdownRequest),
            "shutdown_response" => Ok(MessageType::ShutdownResponse),
            "plan_approval_response" => Ok(MessageType::PlanApprovalResponse),
            other => Err(format!(
                "unknown message type '{other}'. Valid values: message, broadcast, \
                 shutdown_request, shutdown_response, plan_approval_response"
            )),
        }
    }
}

/// One line of an inbox file.
///
/// Messages are immutable once written; ordering within an inbox is append
/// order. Stored as newline-delimited JSON at
/// `teams/{team}/inbox.{name}.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Message type tag
    #[serde(rename = "type")]
    pub kind: MessageType,

    /// Sender agent id (advisory metadata, not validated)
    pub sender: String,

    /// Recipient name; empty in the original envelope of a broadcast
    pub recipient: String,

    /// Message content (markdown supported)
    pub content: String,

    /// ISO 8601 UTC timestamp
    pub timestamp: String,

    /// Correlation id for the shutdown and plan-approval protocols
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Unknown fields for forward compatibility
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

impl Message {
    /// Build a message stamped with the current UTC time.
    pub fn new(kind: MessageType, sender: &str, recipient: &str, content: &str) -> Self {
        Message {
            kind,
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            content: content.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id: None,
            unknown_fields: HashMap::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}
