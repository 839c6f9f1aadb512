//! History tidy filter for Chat Completions parts.

use std::collections::HashSet;

use crate::providers::FilterOutcome;

use super::types::ChatPart;

pub fn filter_blocks(
    content: &[ChatPart],
    removed_tool_names: &HashSet<String>,
    is_checkpoint: bool,
    removed_tool_use_ids: &HashSet<String>,
) -> FilterOutcome<Vec<ChatPart>> {
    let new_removed_ids: Vec<String> = if is_checkpoint {
        Vec::new()
    } else {
        content
            .iter()
            .filter_map(|part| match part {
                ChatPart::ToolCall { id, name, .. } if removed_tool_names.contains(name) => {
                    Some(id.clone())
                }
                _ => None,
            })
            .collect()
    };

    let filtered = content
        .iter()
        .filter(|part| match part {
            ChatPart::Reasoning { .. } => false,
            _ if is_checkpoint => true,
            ChatPart::ToolCall { id, .. } => !new_removed_ids.contains(id),
            ChatPart::ToolResult { tool_call_id, .. } => {
                !removed_tool_use_ids.contains(tool_call_id) && !new_removed_ids.contains(tool_call_id)
            }
            ChatPart::Text { .. } => true,
        })
        .cloned()
        .collect();

    FilterOutcome {
        filtered: Some(filtered),
        new_removed_ids,
    }
}
