//! Tool dispatch: a closed enumeration of tool variants and their handlers.
//!
//! Adding a tool is a one-site change: a variant, its name mapping, and a
//! handler arm. Tool errors are never fatal to a loop; every failure is
//! rendered as an `"Error: <kind>: <detail>"` string and handed back to the
//! model as a tool result.

pub mod leaf;
pub mod skills;
pub mod specs;
pub mod subagent;

use crate::context::{LoopConfig, RuntimeContext};
use crate::error::RuntimeError;
use crate::inbox;
use crate::protocol;
use crate::registry::LEAD_NAME;
use crate::board::TaskChanges;
use agent_crew_core::schema::{MessageType, Task, TaskStatus};
use serde_json::Value;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Who is invoking tools: a worker teammate or the top-level user agent.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    pub name: String,
    pub team: Option<String>,
    pub is_lead: bool,
}

impl AgentIdentity {
    pub fn lead(team: Option<String>) -> Self {
        AgentIdentity {
            name: LEAD_NAME.to_string(),
            team,
            is_lead: true,
        }
    }

    pub fn teammate(name: &str, team: &str) -> Self {
        AgentIdentity {
            name: name.to_string(),
            team: Some(team.to_string()),
            is_lead: false,
        }
    }

    pub fn agent_id(&self) -> String {
        match &self.team {
            Some(team) => format!("{}@{team}", self.name),
            None => self.name.clone(),
        }
    }
}

/// The closed set of tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Bash,
    ReadFile,
    WriteFile,
    EditFile,
    TaskCreate,
    TaskGet,
    TaskUpdate,
    TaskList,
    TaskOutput,
    TaskStop,
    SendMessage,
    Subagent,
    Skill,
    TeamCreate,
    TeamDelete,
}

impl ToolKind {
    /// Tools only the user agent may invoke.
    pub fn is_lead_only(self) -> bool {
        matches!(self, ToolKind::TeamCreate | ToolKind::TeamDelete)
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bash" => Ok(ToolKind::Bash),
            "read_file" => Ok(ToolKind::ReadFile),
            "write_file" => Ok(ToolKind::WriteFile),
            "edit_file" => Ok(ToolKind::EditFile),
            "TaskCreate" => Ok(ToolKind::TaskCreate),
            "TaskGet" => Ok(ToolKind::TaskGet),
            "TaskUpdate" => Ok(ToolKind::TaskUpdate),
            "TaskList" => Ok(ToolKind::TaskList),
            "TaskOutput" => Ok(ToolKind::TaskOutput),
            "TaskStop" => Ok(ToolKind::TaskStop),
            "SendMessage" => Ok(ToolKind::SendMessage),
            "Task" => Ok(ToolKind::Subagent),
            "Skill" => Ok(ToolKind::Skill),
            "TeamCreate" => Ok(ToolKind::TeamCreate),
            "TeamDelete" => Ok(ToolKind::TeamDelete),
            other => Err(format!("unknown tool '{other}'")),
        }
    }
}

fn required_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, RuntimeError> {
    input
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| RuntimeError::InvalidInput(format!("missing required field '{key}'")))
}

fn optional_str<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

fn string_array(input: &Value, key: &str) -> Vec<String> {
    input
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Messaging and board I/O errors are retried once; second failures
/// surface as tool errors.
fn with_retry<T>(
    op: &str,
    mut f: impl FnMut() -> Result<T, RuntimeError>,
) -> Result<T, RuntimeError> {
    match f() {
        Ok(value) => Ok(value),
        Err(err @ RuntimeError::Store(_)) => {
            warn!("{op} failed, retrying once: {err}");
            f()
        }
        Err(err) => Err(err),
    }
}

fn render_task(task: &Task) -> String {
    serde_json::to_string_pretty(task).unwrap_or_else(|_| format!("task {}", task.id))
}

fn render_task_line(task: &Task) -> String {
    let mut line = format!("[{}] {} {}", task.id, task.status, task.subject);
    if let Some(owner) = &task.owner {
        line.push_str(&format!(" (owner: {owner})"));
    }
    if !task.blocked_by.is_empty() {
        line.push_str(&format!(" (blocked by: {})", task.blocked_by.join(", ")));
    }
    line
}

/// Execute the four leaf tools only. Used by subagents, whose tool sets are
/// filtered to leaves before this is reached.
pub(crate) fn run_leaf_only(
    workspace_root: &Path,
    config: &LoopConfig,
    name: &str,
    input: &Value,
) -> String {
    let result = match name {
        "bash" => {
            required_str(input, "command").and_then(|cmd| leaf::run_bash(workspace_root, config, cmd))
        }
        "read_file" => {
            required_str(input, "path").and_then(|path| leaf::read_file(workspace_root, config, path))
        }
        "write_file" => required_str(input, "path").and_then(|path| {
            required_str(input, "content")
                .and_then(|content| leaf::write_file(workspace_root, path, content))
        }),
        "edit_file" => required_str(input, "path").and_then(|path| {
            let old_string = required_str(input, "old_string")?;
            let new_string = required_str(input, "new_string")?;
            leaf::edit_file(workspace_root, path, old_string, new_string)
        }),
        other => Err(RuntimeError::InvalidInput(format!("unknown tool '{other}'"))),
    };
    match result {
        Ok(output) => output,
        Err(err) => format!("Error: {err}"),
    }
}

/// Execute a tool on behalf of `caller` and render the result for the
/// model. Never panics, never aborts the calling loop.
pub fn dispatch(
    ctx: &Arc<RuntimeContext>,
    caller: &AgentIdentity,
    tool_name: &str,
    input: &Value,
) -> String {
    let kind = match ToolKind::from_str(tool_name) {
        Ok(kind) => kind,
        Err(detail) => return format!("Error: InvalidInput: {detail}"),
    };
    if kind.is_lead_only() && !caller.is_lead {
        return format!(
            "Error: InvalidInput: tool '{tool_name}' is not available to teammates"
        );
    }
    match run_tool(ctx, caller, kind, input) {
        Ok(output) => output,
        Err(err) => format!("Error: {err}"),
    }
}

fn run_tool(
    ctx: &Arc<RuntimeContext>,
    caller: &AgentIdentity,
    kind: ToolKind,
    input: &Value,
) -> Result<String, RuntimeError> {
    match kind {
        ToolKind::Bash | ToolKind::ReadFile | ToolKind::WriteFile | ToolKind::EditFile => {
            let name = match kind {
                ToolKind::Bash => "bash",
                ToolKind::ReadFile => "read_file",
                ToolKind::WriteFile => "write_file",
                _ => "edit_file",
            };
            Ok(run_leaf_only(&ctx.workspace_root, &ctx.config, name, input))
        }

        ToolKind::TaskCreate => {
            let subject = required_str(input, "subject")?;
            let body = optional_str(input, "body").map(str::to_string);
            let task = with_retry("TaskCreate", || ctx.board.create(subject, body.clone()))?;
            Ok(format!("Created task {}: {}", task.id, task.subject))
        }

        ToolKind::TaskGet => {
            let id = required_str(input, "task_id")?;
            let task = with_retry("TaskGet", || ctx.board.get(id))?;
            Ok(render_task(&task))
        }

        ToolKind::TaskUpdate => {
            let id = required_str(input, "task_id")?;
            let status = optional_str(input, "status")
                .map(TaskStatus::from_str)
                .transpose()
                .map_err(RuntimeError::InvalidInput)?;
            let changes = TaskChanges {
                status,
                owner: optional_str(input, "owner").map(str::to_string),
                subject: optional_str(input, "subject").map(str::to_string),
                body: optional_str(input, "body").map(str::to_string),
                add_blocked_by: string_array(input, "addBlockedBy"),
                remove_blocked_by: string_array(input, "removeBlockedBy"),
            };
            let task = with_retry("TaskUpdate", || ctx.board.update(id, changes.clone()))?;
            Ok(render_task(&task))
        }

        ToolKind::TaskList => {
            let tasks = with_retry("TaskList", || ctx.board.list_all())?;
            if tasks.is_empty() {
                return Ok("(no tasks)".to_string());
            }
            Ok(tasks
                .iter()
                .map(render_task_line)
                .collect::<Vec<_>>()
                .join("\n"))
        }

        ToolKind::TaskOutput => {
            let handle = required_str(input, "task_id")?;
            let block = input.get("block").and_then(Value::as_bool).unwrap_or(false);
            let timeout_ms = input
                .get("timeout_ms")
                .and_then(Value::as_u64)
                .unwrap_or(10_000);
            let output = ctx
                .executor
                .get_output(handle, block, Duration::from_millis(timeout_ms))
                .map_err(|e| RuntimeError::InvalidInput(e.to_string()))?;
            if output.is_empty() {
                Ok("(no new output)".to_string())
            } else {
                Ok(output)
            }
        }

        ToolKind::TaskStop => {
            let handle = required_str(input, "task_id")?;
            ctx.executor
                .stop(handle)
                .map_err(|e| RuntimeError::InvalidInput(e.to_string()))?;
            Ok(format!("Requested stop of {handle}"))
        }

        ToolKind::SendMessage => {
            let kind = MessageType::from_str(required_str(input, "type")?)
                .map_err(RuntimeError::InvalidInput)?;
            let recipient = required_str(input, "recipient")?;
            let content = required_str(input, "content")?;
            let mut request_id = optional_str(input, "request_id").map(str::to_string);

            // A controller-originated shutdown_request gets a fresh id and a
            // pending entry so the acknowledgement can be matched later.
            if kind == MessageType::ShutdownRequest {
                let id = request_id.unwrap_or_else(protocol::new_request_id);
                if caller.is_lead {
                    let (name, team) = match recipient.split_once('@') {
                        Some((name, team)) => (name, team.to_string()),
                        None => (recipient, caller.team.clone().unwrap_or_default()),
                    };
                    ctx.pending_shutdowns.record(&id, &team, name);
                }
                request_id = Some(id);
            }

            with_retry("SendMessage", || {
                inbox::send_message(
                    &ctx.registry,
                    kind,
                    recipient,
                    content,
                    &caller.agent_id(),
                    caller.team.as_deref(),
                    request_id.clone(),
                )
            })
        }

        ToolKind::Subagent => {
            let agent_type = required_str(input, "agent_type")?;
            let prompt = required_str(input, "prompt")?;
            subagent::run_subagent(ctx, agent_type, prompt)
        }

        ToolKind::Skill => {
            let name = required_str(input, "name")?;
            skills::load_skill(&ctx.workspace_root, name)
        }

        ToolKind::TeamCreate => {
            let team = required_str(input, "team_name")?;
            let mut out = ctx.registry.create_team(team)?;
            if let Some(teammates) = input.get("teammates").and_then(Value::as_array) {
                for entry in teammates {
                    let name = required_str(entry, "name")?;
                    let prompt = required_str(entry, "prompt")?;
                    let spawned = ctx.registry.spawn(ctx, name, team, prompt)?;
                    let handle = spawned["handle"].as_str().unwrap_or("?");
                    out.push_str(&format!("\nSpawned {name}@{team} ({handle})"));
                }
            }
            Ok(out)
        }

        ToolKind::TeamDelete => {
            let team = required_str(input, "team_name")?;
            ctx.registry.delete_team(team, &ctx.pending_shutdowns)
        }
    }
}
