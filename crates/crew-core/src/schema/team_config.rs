//! Team configuration schema
//!
//! Stored at `teams/{team}/config.json` and rewritten atomically after
//! every membership change.

use super::MemberEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Team configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamConfig {
    /// Team name (matches directory name)
    pub name: String,

    /// Lead agent id (format: "team-lead@{team}")
    pub lead_agent_id: String,

    /// ISO 8601 timestamp when the team was created
    pub created_at: String,

    /// Members, lead first, then workers in spawn order
    pub members: Vec<MemberEntry>,

    /// Unknown fields for forward compatibility
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}
