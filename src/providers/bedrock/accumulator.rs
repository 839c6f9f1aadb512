//! Rebuilds the Converse content blocks of a turn, keyed by content block index.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::providers::parse_tool_input;

use super::types::{
    BedrockBlock, BedrockEvent, ConverseResponse, ReasoningContent, ReasoningText, ToolUseBlock,
};

/// Full-content accumulator for Converse turns.
#[derive(Debug, Default, Clone)]
pub struct BedrockAccumulator {
    blocks: BTreeMap<usize, BedrockBlock>,
    tool_input: BTreeMap<usize, String>,
    highest_index: Option<usize>,
}

impl BedrockAccumulator {
    #[must_use]
    pub fn from_response(response: &ConverseResponse) -> Self {
        Self {
            blocks: response.content().iter().cloned().enumerate().collect(),
            tool_input: BTreeMap::new(),
            highest_index: response.content().len().checked_sub(1),
        }
    }

    pub fn observe(&mut self, event: &BedrockEvent) {
        match event {
            BedrockEvent::ContentBlockStart(start) => {
                let index = start.content_block_index;
                self.note_index(index);
                if let Some(tool) = start.start.as_ref().and_then(|s| s.tool_use.as_ref()) {
                    self.blocks.insert(
                        index,
                        BedrockBlock::ToolUse(ToolUseBlock {
                            tool_use_id: tool.tool_use_id.clone(),
                            name: tool.name.clone(),
                            input: Value::Null,
                        }),
                    );
                }
            }
            BedrockEvent::ContentBlockDelta(delta) => {
                let index = delta.content_block_index;
                self.note_index(index);
                let delta = &delta.delta;
                if let Some(text) = &delta.text {
                    let block = self
                        .blocks
                        .entry(index)
                        .or_insert_with(|| BedrockBlock::Text(String::new()));
                    if let BedrockBlock::Text(existing) = block {
                        existing.push_str(text);
                    }
                }
                if let Some(reasoning) = &delta.reasoning_content {
                    let block = self
                        .blocks
                        .entry(index)
                        .or_insert_with(|| BedrockBlock::ReasoningContent(ReasoningContent::default()));
                    if let BedrockBlock::ReasoningContent(content) = block {
                        if let Some(redacted) = &reasoning.redacted_content {
                            content
                                .redacted_content
                                .get_or_insert_with(String::new)
                                .push_str(redacted);
                        }
                        if reasoning.text.is_some() || reasoning.signature.is_some() {
                            let target = content
                                .reasoning_text
                                .get_or_insert_with(ReasoningText::default);
                            if let Some(text) = &reasoning.text {
                                target.text.push_str(text);
                            }
                            if let Some(signature) = &reasoning.signature {
                                target
                                    .signature
                                    .get_or_insert_with(String::new)
                                    .push_str(signature);
                            }
                        }
                    }
                }
                if let Some(tool) = &delta.tool_use {
                    self.tool_input
                        .entry(index)
                        .or_default()
                        .push_str(&tool.input);
                }
            }
            _ => {}
        }
    }

    fn note_index(&mut self, index: usize) {
        match self.highest_index {
            Some(highest) if index < highest => {
                tracing::debug!(index, highest, "Bedrock block event arrived out of index order");
            }
            Some(highest) if index == highest => {}
            _ => self.highest_index = Some(index),
        }
    }

    /// Blocks in index order; tool input is parsed here, once.
    #[must_use]
    pub fn finalize(self) -> Vec<BedrockBlock> {
        let Self {
            blocks,
            mut tool_input,
            ..
        } = self;
        blocks
            .into_iter()
            .map(|(index, block)| match block {
                BedrockBlock::ToolUse(mut tool) => {
                    let raw = tool_input.remove(&index).unwrap_or_default();
                    tool.input = parse_tool_input(&raw, Some(&tool.input), &tool.name);
                    BedrockBlock::ToolUse(tool)
                }
                other => other,
            })
            .collect()
    }
}
