//! Runtime error kinds.
//!
//! Every variant's display form is `<kind>: <detail>`; the tool layer
//! prefixes `Error: ` when reporting a failure to the model, producing the
//! `"Error: <kind>: <detail>"` strings agents see as tool results.

use agent_crew_core::io::StoreError;
use thiserror::Error;

/// Errors surfaced by registry, board, inbox, and tool operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Non-broadcast message addressed to an unknown recipient
    #[error("RecipientNotFound: no recipient named '{0}'")]
    RecipientNotFound(String),

    /// Team lifecycle operation on a missing team
    #[error("TeamNotFound: no team named '{0}'")]
    TeamNotFound(String),

    /// Team creation collided with an existing team
    #[error("AlreadyExists: team '{0}' already exists")]
    AlreadyExists(String),

    /// Task operation on a missing task id
    #[error("TaskNotFound: no task with id '{0}'")]
    TaskNotFound(String),

    /// Wall-clock expiry of the bash leaf tool
    #[error("TimedOut: {0}")]
    TimedOut(String),

    /// Bash prefilter refused the command
    #[error("Dangerous: {0}")]
    Dangerous(String),

    /// File tool target outside the workspace root
    #[error("PathEscape: {0}")]
    PathEscape(String),

    /// Schema violation in tool input or message envelope
    #[error("InvalidInput: {0}")]
    InvalidInput(String),

    /// LLM backend failure
    #[error("OracleError: {0}")]
    OracleError(String),

    /// Durable store failure that survived one retry
    #[error("Io: {0}")]
    Store(#[from] StoreError),
}
