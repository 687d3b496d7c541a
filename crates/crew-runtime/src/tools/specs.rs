//! Tool specification builders: the JSON schemas advertised to the model.
//!
//! The user agent sees 15 tools; teammates see 13 (everything except
//! `TeamCreate` and `TeamDelete`).

use crate::oracle::ToolSpec;
use serde_json::json;

fn spec(
    name: &str,
    description: &str,
    properties: serde_json::Value,
    required: &[&str],
) -> ToolSpec {
    ToolSpec {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

pub fn bash_tool() -> ToolSpec {
    spec(
        "bash",
        "Run a shell command in the workspace and return its combined output. \
         Commands time out after 120 seconds; destructive commands are refused.",
        json!({
            "command": {"type": "string", "description": "The shell command to execute."},
        }),
        &["command"],
    )
}

pub fn read_file_tool() -> ToolSpec {
    spec(
        "read_file",
        "Read a file inside the workspace and return its contents.",
        json!({
            "path": {"type": "string", "description": "Path relative to the workspace root."},
        }),
        &["path"],
    )
}

pub fn write_file_tool() -> ToolSpec {
    spec(
        "write_file",
        "Create or overwrite a file inside the workspace.",
        json!({
            "path": {"type": "string", "description": "Path relative to the workspace root."},
            "content": {"type": "string", "description": "Full file contents to write."},
        }),
        &["path", "content"],
    )
}

pub fn edit_file_tool() -> ToolSpec {
    spec(
        "edit_file",
        "Replace the first occurrence of old_string with new_string in a workspace file. \
         Fails when old_string is not present.",
        json!({
            "path": {"type": "string", "description": "Path relative to the workspace root."},
            "old_string": {"type": "string", "description": "Exact text to replace."},
            "new_string": {"type": "string", "description": "Replacement text."},
        }),
        &["path", "old_string", "new_string"],
    )
}

pub fn task_create_tool() -> ToolSpec {
    spec(
        "TaskCreate",
        "Create a task on the shared board. Returns its id.",
        json!({
            "subject": {"type": "string", "description": "Brief imperative title."},
            "body": {"type": "string", "description": "Detailed requirements (optional)."},
        }),
        &["subject"],
    )
}

pub fn task_get_tool() -> ToolSpec {
    spec(
        "TaskGet",
        "Fetch one task from the board by id.",
        json!({
            "task_id": {"type": "string", "description": "Task id, e.g. \"1\"."},
        }),
        &["task_id"],
    )
}

pub fn task_update_tool() -> ToolSpec {
    spec(
        "TaskUpdate",
        "Update a task's fields. Claim a pending, unowned, unblocked task by setting \
         owner to your name and status to in_progress, then re-read to confirm you \
         won the claim. Completing or cancelling a task unblocks its dependents.",
        json!({
            "task_id": {"type": "string", "description": "Task id to update."},
            "status": {"type": "string", "description": "pending | in_progress | completed | cancelled"},
            "owner": {"type": "string", "description": "Agent name to assign."},
            "addBlockedBy": {"type": "array", "items": {"type": "string"},
                             "description": "Task ids to add as blockers."},
            "removeBlockedBy": {"type": "array", "items": {"type": "string"},
                                "description": "Task ids to remove from blockers."},
        }),
        &["task_id"],
    )
}

pub fn task_list_tool() -> ToolSpec {
    spec(
        "TaskList",
        "List every task on the shared board with status, owner, and blockers.",
        json!({}),
        &[],
    )
}

pub fn task_output_tool() -> ToolSpec {
    spec(
        "TaskOutput",
        "Read output produced by a background unit (e.g. a spawned teammate) since \
         the last read. Optionally block until new output arrives.",
        json!({
            "task_id": {"type": "string", "description": "Handle such as \"t7\"."},
            "block": {"type": "boolean", "description": "Wait for new output (default false)."},
            "timeout_ms": {"type": "integer", "description": "Wait budget in milliseconds (default 10000)."},
        }),
        &["task_id"],
    )
}

pub fn task_stop_tool() -> ToolSpec {
    spec(
        "TaskStop",
        "Request a cooperative stop of a background unit by handle.",
        json!({
            "task_id": {"type": "string", "description": "Handle such as \"t7\"."},
        }),
        &["task_id"],
    )
}

pub fn send_message_tool() -> ToolSpec {
    spec(
        "SendMessage",
        "Send a message to a teammate or the team lead, or broadcast to every \
         non-sender team member. recipient must be empty exactly when type is \
         broadcast. shutdown_response and plan_approval_response must echo the \
         request_id they answer.",
        json!({
            "type": {"type": "string",
                     "description": "message | broadcast | shutdown_request | shutdown_response | plan_approval_response"},
            "recipient": {"type": "string",
                          "description": "Recipient name, or name@team; empty for broadcast."},
            "content": {"type": "string", "description": "Message content."},
            "request_id": {"type": "string", "description": "Correlation id for protocol replies."},
        }),
        &["type", "recipient", "content"],
    )
}

pub fn subagent_tool() -> ToolSpec {
    spec(
        "Task",
        "Dispatch an isolated subagent with a fresh context to explore, plan, or \
         implement, and return only its final summary. Use for work whose \
         intermediate output would pollute your context.",
        json!({
            "agent_type": {"type": "string",
                           "description": "Explore (read-only) | Plan (read-only) | general-purpose"},
            "prompt": {"type": "string", "description": "What the subagent should do."},
        }),
        &["agent_type", "prompt"],
    )
}

pub fn skill_tool() -> ToolSpec {
    spec(
        "Skill",
        "Load a named skill (domain knowledge document) from the workspace's skills \
         directory and return its text.",
        json!({
            "name": {"type": "string", "description": "Skill name, e.g. \"code-review\"."},
        }),
        &["name"],
    )
}

pub fn team_create_tool() -> ToolSpec {
    spec(
        "TeamCreate",
        "Create a new named team, optionally spawning an initial set of teammates. \
         Each teammate gets a persistent agent loop, an inbox, and a palette color.",
        json!({
            "team_name": {"type": "string", "description": "Unique team name."},
            "teammates": {
                "type": "array",
                "description": "Initial teammates to spawn.",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string", "description": "Teammate name, unique within the team."},
                        "prompt": {"type": "string", "description": "The teammate's initial instructions."},
                    },
                    "required": ["name", "prompt"],
                },
            },
        }),
        &["team_name"],
    )
}

pub fn team_delete_tool() -> ToolSpec {
    spec(
        "TeamDelete",
        "Delete a team: every teammate receives a shutdown_request and the team is \
         removed once acknowledged. The team directory is retained on disk.",
        json!({
            "team_name": {"type": "string", "description": "Team to delete."},
        }),
        &["team_name"],
    )
}

/// The 13 tools a teammate sees.
pub fn teammate_tools() -> Vec<ToolSpec> {
    vec![
        bash_tool(),
        read_file_tool(),
        write_file_tool(),
        edit_file_tool(),
        task_create_tool(),
        task_get_tool(),
        task_update_tool(),
        task_list_tool(),
        task_output_tool(),
        task_stop_tool(),
        send_message_tool(),
        subagent_tool(),
        skill_tool(),
    ]
}

/// The 15 tools the user agent sees: the teammate set plus team lifecycle.
pub fn user_agent_tools() -> Vec<ToolSpec> {
    let mut tools = teammate_tools();
    tools.push(team_create_tool());
    tools.push(team_delete_tool());
    tools
}

/// Filtered leaf set for a subagent type.
///
/// # Errors
///
/// Unknown agent types are rejected.
pub fn subagent_tools(agent_type: &str) -> Result<Vec<ToolSpec>, String> {
    match agent_type {
        "Explore" | "Plan" => Ok(vec![bash_tool(), read_file_tool()]),
        "general-purpose" => Ok(vec![
            bash_tool(),
            read_file_tool(),
            write_file_tool(),
            edit_file_tool(),
        ]),
        other => Err(format!(
            "unknown agent_type '{other}'. Valid values: Explore, Plan, general-purpose"
        )),
    }
}
