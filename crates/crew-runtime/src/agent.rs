//! The agent loop: LLM call, tool dispatch, notification draining, and
//! context compaction.
//!
//! One loop instance drives one teammate (or the top-level user agent).
//! Rounds repeat: drain the inbox into synthetic observations, call the
//! model, execute any requested tools in order, compact if the
//! conversation outgrew its budget. A worker that ends a round with a
//! text-only reply and an empty inbox quiesces to `idle` until traffic
//! arrives or its team is deleted; the user-driven variant instead returns
//! control to its caller.

use crate::compact;
use crate::context::RuntimeContext;
use crate::executor::WorkerHandle;
use crate::inbox;
use crate::oracle::{ChatMessage, ContentBlock, OracleRequest, Role, StopReason, ToolSpec};
use crate::registry::StatusCell;
use crate::tools::{self, AgentIdentity};
use agent_crew_core::io::inbox::{inbox_drain, inbox_has_mail};
use agent_crew_core::schema::{Message, MessageType, TeammateStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

const USER_AGENT_SYSTEM_PROMPT: &str = "You are the lead agent of a coding crew. \
You can work directly with files and shell, organize work on the shared task \
board, and manage teams: create a team, spawn teammates, message them, and \
delete the team when the work is done. Prefer delegating long or parallel work \
to teammates and coordinate through tasks and messages.";

fn teammate_system_prompt(name: &str, team: &str) -> String {
    format!(
        "You are '{name}', a teammate on team '{team}'. Work the task board: claim \
         a pending, unowned, unblocked task by setting yourself as owner with \
         status in_progress, do the work, then mark it completed. Report to the \
         team lead with SendMessage. Between assignments you will be woken when \
         new messages arrive. When you receive a shutdown_request, wrap up \
         immediately."
    )
}

/// Everything a teammate loop needs about itself; the registry is
/// dereferenced by name, never back-pointered.
pub(crate) struct TeammateSeat {
    pub name: String,
    pub team: String,
    pub inbox_path: PathBuf,
    pub status: StatusCell,
    pub initial_prompt: String,
}

/// Render a drained message as a system-visible observation turn.
fn observation_turn(message: &Message) -> ChatMessage {
    ChatMessage::user_text(format!(
        "[{} from {}] {}",
        message.kind, message.sender, message.content
    ))
}

/// Run one round: model call, then tool dispatch.
///
/// Returns `Some(text)` when the round was terminal for this invocation
/// (text-only reply, or a backend failure surfaced as a terminal text
/// message). Returns `None` when tools ran and the loop should continue.
fn one_round(
    ctx: &Arc<RuntimeContext>,
    caller: &AgentIdentity,
    system: &str,
    conversation: &mut Vec<ChatMessage>,
    tools: &[ToolSpec],
) -> Option<String> {
    let response = match ctx.oracle.call(OracleRequest {
        system,
        messages: conversation.as_slice(),
        tools,
        max_tokens: ctx.config.max_model_tokens,
    }) {
        Ok(response) => response,
        Err(e) => {
            warn!("oracle call failed for {}: {e}", caller.agent_id());
            return Some(format!("Error: OracleError: {e}"));
        }
    };

    let tool_uses: Vec<(String, String, serde_json::Value)> = response
        .tool_uses()
        .into_iter()
        .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
        .collect();

    if response.stop_reason != StopReason::ToolUse || tool_uses.is_empty() {
        let text = response.text();
        conversation.push(ChatMessage {
            role: Role::Assistant,
            content: response.content,
        });
        return Some(text);
    }

    conversation.push(ChatMessage {
        role: Role::Assistant,
        content: response.content.clone(),
    });

    let mut results = Vec::new();
    for (id, name, input) in tool_uses {
        debug!("{} -> {name}", caller.agent_id());
        let output = tools::dispatch(ctx, caller, &name, &input);
        results.push(ContentBlock::ToolResult {
            tool_use_id: id,
            content: output,
        });
    }
    conversation.push(ChatMessage {
        role: Role::User,
        content: results,
    });
    None
}

fn maybe_compact(ctx: &Arc<RuntimeContext>, conversation: &mut Vec<ChatMessage>) {
    match compact::microcompact(ctx.oracle.as_ref(), conversation, &ctx.config.compaction) {
        Ok(true) => debug!("conversation compacted to {} turns", conversation.len()),
        Ok(false) => {}
        Err(e) => warn!("microcompact failed, continuing uncompacted: {e}"),
    }
}

fn acknowledge_shutdown(ctx: &Arc<RuntimeContext>, identity: &AgentIdentity, request: &Message) {
    let request_id = request
        .request_id
        .clone()
        .unwrap_or_else(|| "unknown".to_string());
    let result = inbox::send_message(
        &ctx.registry,
        MessageType::ShutdownResponse,
        &request.sender,
        "acknowledged; shutting down",
        &identity.agent_id(),
        identity.team.as_deref(),
        Some(request_id),
    );
    if let Err(e) = result {
        warn!(
            "{} could not deliver shutdown_response: {e}",
            identity.agent_id()
        );
    }
}

/// The worker variant of the loop; runs on a Background Executor thread
/// until shutdown.
pub(crate) fn run_teammate_loop(
    ctx: Arc<RuntimeContext>,
    worker: WorkerHandle,
    seat: TeammateSeat,
) {
    let identity = AgentIdentity::teammate(&seat.name, &seat.team);
    let system = teammate_system_prompt(&seat.name, &seat.team);
    let tools = tools::specs::teammate_tools();
    let mut conversation = vec![ChatMessage::user_text(&seat.initial_prompt)];

    info!("{} started", identity.agent_id());
    'lifecycle: loop {
        if worker.stop_requested() {
            break;
        }

        // Pre-round drain: messages become observations; a shutdown_request
        // short-circuits the round.
        let drained = match inbox_drain(&seat.inbox_path) {
            Ok(messages) => messages,
            Err(e) => {
                warn!("{} failed to drain inbox: {e}", identity.agent_id());
                Vec::new()
            }
        };
        let mut shutdown_request: Option<Message> = None;
        for message in drained {
            conversation.push(observation_turn(&message));
            if message.kind == MessageType::ShutdownRequest && shutdown_request.is_none() {
                shutdown_request = Some(message);
            }
        }
        if let Some(request) = shutdown_request {
            acknowledge_shutdown(&ctx, &identity, &request);
            seat.status.set(TeammateStatus::Shutdown);
            worker.push_output(&format!("[{}] shutdown acknowledged\n", identity.agent_id()));
            break;
        }

        match one_round(&ctx, &identity, &system, &mut conversation, &tools) {
            None => {
                maybe_compact(&ctx, &mut conversation);
            }
            Some(reply) => {
                if !reply.is_empty() {
                    worker.push_output(&format!("{reply}\n"));
                }
                maybe_compact(&ctx, &mut conversation);

                if inbox_has_mail(&seat.inbox_path) {
                    continue;
                }

                // Idle transition: quiesce until traffic or team deletion.
                seat.status.set(TeammateStatus::Idle);
                debug!("{} idle", identity.agent_id());
                loop {
                    if inbox_has_mail(&seat.inbox_path) {
                        // A shutdown flip races with its own request message;
                        // keep the terminal status and let the drain ack it.
                        if seat.status.get() != TeammateStatus::Shutdown {
                            seat.status.set(TeammateStatus::Active);
                        }
                        break;
                    }
                    if worker.stop_requested()
                        || seat.status.get() == TeammateStatus::Shutdown
                        || ctx.registry.find(&seat.name, Some(&seat.team)).is_none()
                    {
                        break 'lifecycle;
                    }
                    std::thread::sleep(ctx.config.idle_poll_interval);
                }
            }
        }
    }

    seat.status.set(TeammateStatus::Shutdown);
    info!("{} exited", identity.agent_id());
    worker.push_output(&format!("[{}] loop exited\n", identity.agent_id()));
}

/// The top-level, user-driven loop. Differs from the worker variant only
/// in quiescence: after a text-only reply it returns control to its caller
/// instead of blocking on an inbox.
pub struct UserAgent {
    ctx: Arc<RuntimeContext>,
    identity: AgentIdentity,
    conversation: Vec<ChatMessage>,
}

impl UserAgent {
    pub fn new(ctx: Arc<RuntimeContext>) -> Self {
        UserAgent {
            ctx,
            identity: AgentIdentity::lead(None),
            conversation: Vec::new(),
        }
    }

    /// Scope the lead to one team (its inbox and broadcast context).
    pub fn with_team(ctx: Arc<RuntimeContext>, team: &str) -> Self {
        UserAgent {
            ctx,
            identity: AgentIdentity::lead(Some(team.to_string())),
            conversation: Vec::new(),
        }
    }

    /// Drive one user prompt to a text-only reply.
    pub fn run_turn(&mut self, prompt: &str) -> String {
        self.drain_notifications();
        self.conversation.push(ChatMessage::user_text(prompt));
        let tools = tools::specs::user_agent_tools();

        loop {
            match one_round(
                &self.ctx,
                &self.identity,
                USER_AGENT_SYSTEM_PROMPT,
                &mut self.conversation,
                &tools,
            ) {
                Some(reply) => {
                    maybe_compact(&self.ctx, &mut self.conversation);
                    return reply;
                }
                None => {
                    maybe_compact(&self.ctx, &mut self.conversation);
                    self.drain_notifications();
                }
            }
        }
    }

    /// Drain the lead's inbox(es) into observations. `shutdown_response`
    /// messages additionally clear their pending-shutdown entries; they
    /// are still surfaced as ordinary observations.
    fn drain_notifications(&mut self) {
        let teams: Vec<String> = match &self.identity.team {
            Some(team) => vec![team.clone()],
            None => self.ctx.registry.team_names(),
        };
        for team in teams {
            let inbox_path = self.ctx.paths.inbox_path(&team, &self.identity.name);
            let drained = match inbox_drain(&inbox_path) {
                Ok(messages) => messages,
                Err(e) => {
                    warn!("lead failed to drain inbox for '{team}': {e}");
                    continue;
                }
            };
            for message in drained {
                if message.kind == MessageType::ShutdownResponse {
                    if let Some(request_id) = &message.request_id {
                        if let Some(entry) = self.ctx.pending_shutdowns.acknowledge(request_id)
                        {
                            debug!(
                                "shutdown of {}@{} acknowledged",
                                entry.name, entry.team
                            );
                        }
                    }
                }
                self.conversation.push(observation_turn(&message));
            }
        }
    }

    /// Read-only view of the conversation (observability, tests).
    pub fn conversation(&self) -> &[ChatMessage] {
        &self.conversation
    }
}
