//! LLM oracle contract and conversation types.
//!
//! The runtime treats the model as an opaque request/response oracle: given
//! a system prompt, a conversation, and tool descriptions, it returns either
//! a text-only reply (terminal for the invocation) or one or more tool-use
//! blocks. The wire shapes here serialize directly to the Anthropic Messages
//! API; see [`anthropic`] for the HTTP client.

pub mod anthropic;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use anthropic::AnthropicOracle;

/// Conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A content block inside a conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text content
    Text { text: String },

    /// The model invoking a tool
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// The result of a prior tool invocation, sent back by the runtime
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

/// One turn of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl ChatMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Concatenated text of all text blocks in this turn.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }
}

/// Description of a tool the model may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The response contains tool-use blocks awaiting results
    ToolUse,
    /// Natural end of a text reply
    EndTurn,
    /// The response was cut off at the token ceiling
    MaxTokens,
    /// Anything else the backend reports
    Other,
}

/// A single oracle invocation.
pub struct OracleRequest<'a> {
    pub system: &'a str,
    pub messages: &'a [ChatMessage],
    pub tools: &'a [ToolSpec],
    pub max_tokens: u32,
}

/// The oracle's reply.
#[derive(Debug, Clone)]
pub struct OracleResponse {
    pub stop_reason: StopReason,
    pub content: Vec<ContentBlock>,
}

impl OracleResponse {
    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    /// Tool-use blocks in response order.
    pub fn tool_uses(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect()
    }
}

/// Failure reported by an oracle backend.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct OracleFailure(pub String);

/// The LLM backend contract.
///
/// Implementations must be internally thread-safe; the runtime shares one
/// oracle across every agent loop.
pub trait Oracle: Send + Sync {
    fn call(&self, request: OracleRequest<'_>) -> Result<OracleResponse, OracleFailure>;
}
