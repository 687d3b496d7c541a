//! Coordination protocol bookkeeping.
//!
//! The shutdown protocol is two-phase: a controller records a pending entry
//! per member, injects a `shutdown_request` into each inbox, and clears the
//! entry when the matching `shutdown_response` (same `request_id`) is
//! drained. Plan approval reuses the same echo discipline but is a query,
//! not a lifecycle change; responses are surfaced as ordinary observations.

use crate::error::RuntimeError;
use agent_crew_core::schema::MessageType;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Allocate a fresh correlation id.
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Controller-side record of an unacknowledged `shutdown_request`.
#[derive(Debug, Clone)]
pub struct PendingShutdown {
    pub team: String,
    pub name: String,
    pub issued_at: String,
}

/// Process-local map `request_id -> PendingShutdown`.
#[derive(Default)]
pub struct PendingShutdowns {
    inner: Mutex<HashMap<String, PendingShutdown>>,
}

impl PendingShutdowns {
    pub fn record(&self, request_id: &str, team: &str, name: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.insert(
            request_id.to_string(),
            PendingShutdown {
                team: team.to_string(),
                name: name.to_string(),
                issued_at: chrono::Utc::now().to_rfc3339(),
            },
        );
    }

    /// Clear the entry for a drained `shutdown_response`. Returns the
    /// record if the id was known; duplicate acknowledgements are no-ops.
    pub fn acknowledge(&self, request_id: &str) -> Option<PendingShutdown> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.remove(request_id)
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Validate a message envelope before delivery.
///
/// The recipient may be empty iff the type is `broadcast`; response types
/// must echo the request id they answer.
///
/// # Errors
///
/// Returns `RuntimeError::InvalidInput` describing the violation.
pub fn validate_envelope(
    kind: MessageType,
    recipient: &str,
    request_id: Option<&str>,
) -> Result<(), RuntimeError> {
    match kind {
        MessageType::Broadcast => {
            if !recipient.is_empty() {
                return Err(RuntimeError::InvalidInput(
                    "recipient must be empty for a broadcast".to_string(),
                ));
            }
        }
        _ => {
            if recipient.is_empty() {
                return Err(RuntimeError::InvalidInput(format!(
                    "recipient is required for '{kind}'"
                )));
            }
        }
    }
    if matches!(
        kind,
        MessageType::ShutdownResponse | MessageType::PlanApprovalResponse
    ) && request_id.is_none_or(str::is_empty)
    {
        return Err(RuntimeError::InvalidInput(format!(
            "'{kind}' must echo the request_id it answers"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique() {
        let a = new_request_id();
        let b = new_request_id();
        assert_ne!(a, b);
    }

    #[test]
    fn record_and_acknowledge() {
        let pending = PendingShutdowns::default();
        assert!(pending.is_empty());

        pending.record("req-1", "t1", "alice");
        pending.record("req-2", "t1", "bob");
        assert_eq!(pending.len(), 2);

        let cleared = pending.acknowledge("req-1").unwrap();
        assert_eq!(cleared.name, "alice");
        assert_eq!(cleared.team, "t1");
        assert_eq!(pending.len(), 1);

        // Duplicate acknowledgement is a no-op.
        assert!(pending.acknowledge("req-1").is_none());
    }

    #[test]
    fn broadcast_requires_empty_recipient() {
        assert!(validate_envelope(MessageType::Broadcast, "", None).is_ok());
        assert!(validate_envelope(MessageType::Broadcast, "alice", None).is_err());
    }

    #[test]
    fn direct_types_require_recipient() {
        assert!(validate_envelope(MessageType::Message, "alice", None).is_ok());
        assert!(validate_envelope(MessageType::Message, "", None).is_err());
        assert!(validate_envelope(MessageType::ShutdownRequest, "", Some("r")).is_err());
    }

    #[test]
    fn responses_must_echo_request_id() {
        assert!(validate_envelope(MessageType::ShutdownResponse, "lead", Some("r1")).is_ok());
        assert!(validate_envelope(MessageType::ShutdownResponse, "lead", None).is_err());
        assert!(validate_envelope(MessageType::ShutdownResponse, "lead", Some("")).is_err());
        assert!(
            validate_envelope(MessageType::PlanApprovalResponse, "lead", None).is_err()
        );
    }
}
