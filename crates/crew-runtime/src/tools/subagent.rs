//! The `Task` tool: isolated subagent dispatch.
//!
//! A subagent is a recursive instantiation of the tool loop with a fresh
//! conversation and a filtered leaf tool set. Only its final text returns
//! to the caller, keeping exploration noise out of the parent's context.

use crate::context::RuntimeContext;
use crate::error::RuntimeError;
use crate::oracle::{ChatMessage, ContentBlock, OracleRequest, Role, StopReason};
use crate::tools::{run_leaf_only, specs};
use std::sync::Arc;
use tracing::debug;

const MAX_SUBAGENT_ROUNDS: usize = 20;

/// Run a subagent to completion and return its final summary.
///
/// # Errors
///
/// `InvalidInput` for unknown agent types, `OracleError` on backend
/// failure.
pub fn run_subagent(
    ctx: &Arc<RuntimeContext>,
    agent_type: &str,
    prompt: &str,
) -> Result<String, RuntimeError> {
    let tools = specs::subagent_tools(agent_type).map_err(RuntimeError::InvalidInput)?;
    let allowed: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    let system = format!(
        "You are a '{agent_type}' subagent with an isolated context. Complete the \
         task, then reply with a concise final summary; only that summary is \
         returned to your caller."
    );

    let mut conversation = vec![ChatMessage::user_text(prompt)];
    for round in 0..MAX_SUBAGENT_ROUNDS {
        let response = ctx
            .oracle
            .call(OracleRequest {
                system: &system,
                messages: conversation.as_slice(),
                tools: tools.as_slice(),
                max_tokens: ctx.config.max_model_tokens,
            })
            .map_err(|e| RuntimeError::OracleError(e.to_string()))?;

        let tool_uses: Vec<(String, String, serde_json::Value)> = response
            .tool_uses()
            .into_iter()
            .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
            .collect();

        if response.stop_reason != StopReason::ToolUse || tool_uses.is_empty() {
            debug!("subagent '{agent_type}' finished after {round} tool rounds");
            return Ok(response.text());
        }

        conversation.push(ChatMessage {
            role: Role::Assistant,
            content: response.content.clone(),
        });

        let mut results = Vec::new();
        for (id, name, input) in tool_uses {
            let output = if allowed.contains(&name.as_str()) {
                run_leaf_only(&ctx.workspace_root, &ctx.config, &name, &input)
            } else {
                format!("Error: InvalidInput: tool '{name}' is not available to this subagent")
            };
            results.push(ContentBlock::ToolResult {
                tool_use_id: id,
                content: output,
            });
        }
        conversation.push(ChatMessage {
            role: Role::User,
            content: results,
        });
    }

    Ok("Subagent stopped at its round limit before finishing.".to_string())
}
