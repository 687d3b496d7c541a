//! Context compaction ("microcompact").
//!
//! When a conversation grows past its token budget, the interior is replaced
//! by a single synthetic assistant turn containing a model-produced summary.
//! The head (the original user prompt) and the most recent turns survive
//! verbatim. The split is a pure function so it can be tested without a
//! loop or a live oracle.

use crate::oracle::{
    ChatMessage, ContentBlock, Oracle, OracleFailure, OracleRequest,
};

const SUMMARY_SYSTEM_PROMPT: &str = "You condense agent conversation history. \
Preserve concrete facts, task ids and their states, file paths, and pending \
obligations. Reply with the summary only, no preamble.";

/// How much interior text the summarizer is shown (tail end).
const SUMMARY_INPUT_CHARS: usize = 8_000;

const SUMMARY_MAX_TOKENS: u32 = 512;

/// When and how much to compact.
#[derive(Debug, Clone)]
pub struct CompactionPolicy {
    /// Estimated-token ceiling before compaction triggers.
    pub max_context_tokens: usize,
    /// Recent turns preserved verbatim.
    pub keep_recent: usize,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        CompactionPolicy {
            max_context_tokens: 150_000,
            keep_recent: 10,
        }
    }
}

/// Rough token estimate: one token per four bytes of content.
pub fn estimate_tokens(messages: &[ChatMessage]) -> usize {
    let bytes: usize = messages
        .iter()
        .flat_map(|m| m.content.iter())
        .map(|block| match block {
            ContentBlock::Text { text } => text.len(),
            ContentBlock::ToolUse { name, input, .. } => {
                name.len() + input.to_string().len()
            }
            ContentBlock::ToolResult { content, .. } => content.len(),
        })
        .sum();
    bytes / 4
}

pub fn should_compact(messages: &[ChatMessage], policy: &CompactionPolicy) -> bool {
    estimate_tokens(messages) > policy.max_context_tokens
}

fn opens_with_tool_result(message: &ChatMessage) -> bool {
    matches!(
        message.content.first(),
        Some(ContentBlock::ToolResult { .. })
    )
}

/// Compute the interior `[head_end, tail_start)` that a compaction pass
/// would replace. Returns `None` when the conversation is too short to
/// have an interior.
///
/// The head is the original user prompt (the system prompt lives outside
/// the conversation). The tail never opens with a dangling `tool_result`
/// turn: the boundary is widened until the preceding assistant turn that
/// requested those tools is also preserved.
pub fn split_for_compaction(
    messages: &[ChatMessage],
    keep_recent: usize,
) -> Option<(usize, usize)> {
    let head_end = 1usize;
    if messages.len() <= head_end + keep_recent {
        return None;
    }
    let mut tail_start = messages.len() - keep_recent;
    while tail_start > head_end && opens_with_tool_result(&messages[tail_start]) {
        tail_start -= 1;
    }
    if tail_start <= head_end {
        return None;
    }
    Some((head_end, tail_start))
}

/// Flatten the interior into plain text for the summarizer, keeping at most
/// the last `max_chars` characters (the tail end of the history).
pub fn render_for_summary(interior: &[ChatMessage], max_chars: usize) -> String {
    let mut rendered = String::new();
    for message in interior {
        for block in &message.content {
            match block {
                ContentBlock::Text { text } => {
                    rendered.push_str(text);
                    rendered.push('\n');
                }
                ContentBlock::ToolUse { name, input, .. } => {
                    rendered.push_str(&format!("(called {name} with {input})\n"));
                }
                ContentBlock::ToolResult { content, .. } => {
                    rendered.push_str(&format!("(tool result) {content}\n"));
                }
            }
        }
    }
    if rendered.chars().count() <= max_chars {
        return rendered;
    }
    let skip = rendered.chars().count() - max_chars;
    rendered.chars().skip(skip).collect()
}

/// Replace the conversation interior with a single synthetic summary turn.
///
/// Returns `Ok(false)` when no compaction was needed or possible.
///
/// # Errors
///
/// Propagates the summarizer oracle failure; the conversation is left
/// untouched in that case.
pub fn microcompact(
    oracle: &dyn Oracle,
    messages: &mut Vec<ChatMessage>,
    policy: &CompactionPolicy,
) -> Result<bool, OracleFailure> {
    if !should_compact(messages, policy) {
        return Ok(false);
    }
    let Some((head_end, tail_start)) = split_for_compaction(messages, policy.keep_recent)
    else {
        return Ok(false);
    };

    let rendered = render_for_summary(&messages[head_end..tail_start], SUMMARY_INPUT_CHARS);
    let prompt = vec![ChatMessage::user_text(format!(
        "Summarize this conversation segment:\n\n{rendered}"
    ))];
    let response = oracle.call(OracleRequest {
        system: SUMMARY_SYSTEM_PROMPT,
        messages: prompt.as_slice(),
        tools: &[],
        max_tokens: SUMMARY_MAX_TOKENS,
    })?;

    let synthetic = ChatMessage::assistant_text(format!(
        "[conversation summary]\n{}",
        response.text()
    ));
    messages.splice(head_end..tail_start, [synthetic]);
    Ok(true)
}
