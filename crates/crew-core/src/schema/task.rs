//! Task board record types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created but not started
    Pending,
    /// Currently being worked on
    InProgress,
    /// Finished successfully
    Completed,
    /// Abandoned without completion
    Cancelled,
}

impl TaskStatus {
    /// Terminal states trigger the unblock sweep: the task id is removed
    /// from every other task's `blocked_by`.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!(
                "unknown task status '{other}'. Valid values: pending, in_progress, \
                 completed, cancelled"
            )),
        }
    }
}

/// A unit of work on the shared board.
///
/// Ids are stable stringified integers assigned by the board, starting at
/// `"1"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Sequential id ("1", "2", ...)
    pub id: String,

    /// Brief imperative title
    pub subject: String,

    /// Detailed requirements, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Current status
    pub status: TaskStatus,

    /// Agent name that owns the task (None if unclaimed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Task ids that must reach a terminal state before this one can start
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,

    /// ISO 8601 creation timestamp
    pub created_at: String,

    /// ISO 8601 last-update timestamp
    pub updated_at: String,

    /// Unknown fields for forward compatibility
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

impl Task {
    /// Whether a worker may claim this task: pending, unowned, unblocked.
    pub fn is_claimable(&self) -> bool {
        self.status == TaskStatus::Pending && self.owner.is_none() && self.blocked_by.is_empty()
    }
}
