//! Message context for a question.

use crate::types::*;

/// Opening messages for a new question.
pub fn build_messages(system_prompt: &str, question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user(question.trim()),
    ]
}

/// Append one model turn and the results of its tool calls.
///
/// Results follow the assistant message in call order so each `tool_call_id`
/// is answered right after the message that issued it.
pub fn append_tool_turn(
    messages: &mut Vec<ChatMessage>,
    content: Option<String>,
    tool_calls: &[ToolCall],
    results: &[ToolResult],
) {
    messages.push(ChatMessage::assistant(content, tool_calls.to_vec()));
    messages.extend(results.iter().map(ChatMessage::tool));
}
