//! History tidy filter for Responses output items.

use std::collections::HashSet;

use crate::providers::FilterOutcome;

use super::types::{OutputItem, WEB_SEARCH_TOOL};

/// Drop reasoning items always; drop selected calls and their outputs before the checkpoint.
pub fn filter_blocks(
    content: &[OutputItem],
    removed_tool_names: &HashSet<String>,
    is_checkpoint: bool,
    removed_tool_use_ids: &HashSet<String>,
) -> FilterOutcome<Vec<OutputItem>> {
    let new_removed_ids: Vec<String> = if is_checkpoint {
        Vec::new()
    } else {
        content
            .iter()
            .filter_map(|item| match item {
                OutputItem::FunctionCall { call_id, name, .. }
                    if removed_tool_names.contains(name) =>
                {
                    Some(call_id.clone())
                }
                OutputItem::WebSearchCall { id, .. }
                    if removed_tool_names.contains(WEB_SEARCH_TOOL) =>
                {
                    Some(id.clone())
                }
                _ => None,
            })
            .collect()
    };

    let filtered = content
        .iter()
        .filter(|item| match item {
            OutputItem::Reasoning { .. } => false,
            _ if is_checkpoint => true,
            OutputItem::FunctionCall { call_id: id, .. } | OutputItem::WebSearchCall { id, .. } => {
                !new_removed_ids.contains(id)
            }
            OutputItem::FunctionCallOutput { call_id, .. } => {
                !removed_tool_use_ids.contains(call_id) && !new_removed_ids.contains(call_id)
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
