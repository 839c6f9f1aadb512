//! History tidy filter for Converse content blocks.

use std::collections::HashSet;

use crate::providers::FilterOutcome;

use super::types::BedrockBlock;

pub fn filter_blocks(
    content: &[BedrockBlock],
    removed_tool_names: &HashSet<String>,
    is_checkpoint: bool,
    removed_tool_use_ids: &HashSet<String>,
) -> FilterOutcome<Vec<BedrockBlock>> {
    let new_removed_ids: Vec<String> = if is_checkpoint {
        Vec::new()
    } else {
        content
            .iter()
            .filter_map(|block| match block {
                BedrockBlock::ToolUse(tool) if removed_tool_names.contains(&tool.name) => {
                    Some(tool.tool_use_id.clone())
                }
                _ => None,
            })
            .collect()
    };

    let filtered = content
        .iter()
        .filter(|block| match block {
            BedrockBlock::ReasoningContent(_) => false,
            _ if is_checkpoint => true,
            BedrockBlock::ToolUse(tool) => !new_removed_ids.contains(&tool.tool_use_id),
            BedrockBlock::ToolResult(result) => {
                !removed_tool_use_ids.contains(&result.tool_use_id)
                    && !new_removed_ids.contains(&result.tool_use_id)
            }
            _ => true,
        })
        .cloned()
        .collect();

    FilterOutcome {
        filtered: Some(filtered),
        new_removed_ids,
    }
}
