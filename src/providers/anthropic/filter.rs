//! History tidy filter for Anthropic content blocks.

use std::collections::HashSet;

use crate::providers::FilterOutcome;

use super::types::AnthropicBlock;

/// Strip reasoning always; strip selected tool activity before the checkpoint.
///
/// Hosted web tools follow the same name rule as client tools, and take their
/// `*_tool_result` blocks with them.
pub fn filter_blocks(
    content: &[AnthropicBlock],
    removed_tool_names: &HashSet<String>,
    is_checkpoint: bool,
    removed_tool_use_ids: &HashSet<String>,
) -> FilterOutcome<Vec<AnthropicBlock>> {
    let new_removed_ids: Vec<String> = if is_checkpoint {
        Vec::new()
    } else {
        content
            .iter()
            .filter_map(|block| match block {
                AnthropicBlock::ToolUse { id, name, .. }
                | AnthropicBlock::ServerToolUse { id, name, .. }
                    if removed_tool_names.contains(name) =>
                {
                    Some(id.clone())
                }
                _ => None,
            })
            .collect()
    };

    let is_removed =
        |id: &String| removed_tool_use_ids.contains(id) || new_removed_ids.contains(id);

    let filtered = content
        .iter()
        .filter(|block| match block {
            AnthropicBlock::Thinking { .. } | AnthropicBlock::RedactedThinking { .. } => false,
            _ if is_checkpoint => true,
            AnthropicBlock::ToolUse { id, .. } | AnthropicBlock::ServerToolUse { id, .. } => {
                !new_removed_ids.contains(id)
            }
            AnthropicBlock::ToolResult { tool_use_id, .. }
            | AnthropicBlock::WebSearchToolResult { tool_use_id, .. }
            | AnthropicBlock::WebFetchToolResult { tool_use_id, .. } => !is_removed(tool_use_id),
            _ => true,
        })
        .cloned()
        .collect();

    FilterOutcome {
        filtered: Some(filtered),
        new_removed_ids,
    }
}
