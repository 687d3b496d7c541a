//! Message delivery: recipient resolution, broadcast fan-out, and drains.
//!
//! File-level append/drain semantics live in `agent_crew_core::io::inbox`;
//! this module adds the registry-aware layer: recipient resolution,
//! broadcast expansion at send time, and the retry-once policy for store
//! failures.

use crate::error::RuntimeError;
use crate::protocol::validate_envelope;
use crate::registry::TeammateRegistry;
use agent_crew_core::io::inbox::{inbox_append, inbox_drain};
use agent_crew_core::schema::{Message, MessageType};
use agent_crew_core::text::{validate_content, DEFAULT_MAX_CONTENT_BYTES};
use std::path::Path;
use tracing::{debug, warn};

fn append_with_retry(inbox_path: &Path, messages: &[Message]) -> Result<(), RuntimeError> {
    if let Err(first) = inbox_append(inbox_path, messages) {
        warn!(
            "inbox append to {} failed, retrying once: {first}",
            inbox_path.display()
        );
        inbox_append(inbox_path, messages)?;
    }
    Ok(())
}

/// Deliver a message (or expand a broadcast) on behalf of `sender_id`.
///
/// Direct messages resolve the recipient through the registry and append
/// one line under the recipient's lock. Broadcasts enumerate the sender's
/// team members at send time, excluding the sender itself, and append one
/// copy per survivor; an empty fan-out still succeeds and reports
/// "reached 0 teammates".
///
/// # Errors
///
/// `RecipientNotFound` for unknown direct recipients, `InvalidInput` for
/// envelope violations, store errors after one retry.
pub fn send_message(
    registry: &TeammateRegistry,
    kind: MessageType,
    recipient: &str,
    content: &str,
    sender_id: &str,
    sender_team: Option<&str>,
    request_id: Option<String>,
) -> Result<String, RuntimeError> {
    validate_envelope(kind, recipient, request_id.as_deref())?;
    validate_content(content, DEFAULT_MAX_CONTENT_BYTES).map_err(RuntimeError::InvalidInput)?;

    if kind == MessageType::Broadcast {
        return broadcast(registry, content, sender_id, sender_team);
    }

    let resolved = registry.resolve_recipient(recipient, sender_team)?;
    let mut message = Message::new(kind, sender_id, recipient, content);
    message.request_id = request_id;

    append_with_retry(&resolved.inbox_path, std::slice::from_ref(&message))?;
    debug!("{sender_id} -> {}: {kind}", resolved.agent_id);
    Ok(format!("Delivered {kind} to {}", resolved.agent_id))
}

fn broadcast(
    registry: &TeammateRegistry,
    content: &str,
    sender_id: &str,
    sender_team: Option<&str>,
) -> Result<String, RuntimeError> {
    let team = match sender_team {
        Some(team) => team.to_string(),
        None => {
            // The lead may omit its team only when exactly one exists.
            let mut names = registry.team_names();
            if names.len() == 1 {
                names.remove(0)
            } else {
                return Err(RuntimeError::InvalidInput(
                    "broadcast requires a team context".to_string(),
                ));
            }
        }
    };

    let sender_name = sender_id.split('@').next().unwrap_or(sender_id);
    let members = registry.members(&team)?;

    let mut reached = 0usize;
    for member in members.iter().filter(|m| m.name != sender_name) {
        let message = Message::new(MessageType::Broadcast, sender_id, &member.name, content);
        append_with_retry(&member.inbox_path, std::slice::from_ref(&message))?;
        reached += 1;
    }

    debug!("broadcast from {sender_id} reached {reached} teammates in '{team}'");
    Ok(format!("Broadcast reached {reached} teammates"))
}

/// Drain a named recipient's inbox through the registry.
///
/// Returns `[]` immediately when another sender or drainer holds the lock.
///
/// # Errors
///
/// `RecipientNotFound` for unknown recipients, store errors otherwise.
pub fn drain_recipient(
    registry: &TeammateRegistry,
    recipient: &str,
    team: Option<&str>,
) -> Result<Vec<Message>, RuntimeError> {
    let resolved = registry.resolve_recipient(recipient, team)?;
    Ok(inbox_drain(&resolved.inbox_path)?)
}
