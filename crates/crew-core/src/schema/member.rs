//! Member entries as persisted in a team's `config.json`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Lifecycle state of a teammate.
///
/// A teammate may oscillate between `Active` and `Idle` any number of times;
/// `Shutdown` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeammateStatus {
    /// Running a round or processing tool calls
    Active,
    /// Quiesced, waiting for inbox traffic
    Idle,
    /// Acknowledged shutdown; the loop has exited or is exiting
    Shutdown,
}

impl fmt::Display for TeammateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TeammateStatus::Active => "active",
            TeammateStatus::Idle => "idle",
            TeammateStatus::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// One member of a team as recorded on disk.
///
/// The lead agent appears as the first entry, with no palette color.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberEntry {
    /// Member name (unique within the team)
    pub name: String,

    /// Unique agent identifier (format: "{name}@{team}")
    pub agent_id: String,

    /// Current lifecycle state
    pub status: TeammateStatus,

    /// Palette color assigned at spawn (absent for the lead)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// Path to the member's inbox file
    pub inbox_path: String,

    /// Unknown fields for forward compatibility
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}
