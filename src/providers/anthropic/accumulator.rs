//! Rebuilds the Anthropic-native content blocks of a turn.
//!
//! Blocks are keyed by content-block index and emitted in index order, so a
//! provider that interleaves deltas for different indexes still produces the
//! right block list. Signatures and redacted thinking are kept verbatim; the
//! display mapper ignores both but resubmission requires them.

use std::collections::BTreeMap;

use crate::providers::parse_tool_input;

use super::types::{AnthropicBlock, AnthropicEvent, AnthropicResponse, BlockDelta};

/// Full-content accumulator for Anthropic turns.
#[derive(Debug, Default, Clone)]
pub struct AnthropicAccumulator {
    blocks: BTreeMap<usize, AnthropicBlock>,
    partial_json: BTreeMap<usize, String>,
    highest_index: Option<usize>,
}

impl AnthropicAccumulator {
    /// Seed from a complete response.
    #[must_use]
    pub fn from_response(response: &AnthropicResponse) -> Self {
        Self {
            blocks: response.content.iter().cloned().enumerate().collect(),
            partial_json: BTreeMap::new(),
            highest_index: response.content.len().checked_sub(1),
        }
    }

    /// Observe one raw stream event.
    pub fn observe(&mut self, event: &AnthropicEvent) {
        match event {
            AnthropicEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                self.note_index(*index);
                self.blocks.insert(*index, content_block.clone());
            }
            AnthropicEvent::ContentBlockDelta { index, delta } => {
                self.note_index(*index);
                self.apply_delta(*index, delta);
            }
            _ => {}
        }
    }

    fn note_index(&mut self, index: usize) {
        match self.highest_index {
            Some(highest) if index < highest => {
                tracing::debug!(index, highest, "Anthropic block event arrived out of index order");
            }
            Some(highest) if index == highest => {}
            _ => self.highest_index = Some(index),
        }
    }

    fn apply_delta(&mut self, index: usize, delta: &BlockDelta) {
        match delta {
            BlockDelta::TextDelta { text } => {
                let block = self
                    .blocks
                    .entry(index)
                    .or_insert_with(|| AnthropicBlock::text(""));
                if let AnthropicBlock::Text { text: existing, .. } = block {
                    existing.push_str(text);
                }
            }
            BlockDelta::ThinkingDelta { thinking } => {
                let block = self
                    .blocks
                    .entry(index)
                    .or_insert_with(|| AnthropicBlock::Thinking {
                        thinking: String::new(),
                        signature: String::new(),
                    });
                if let AnthropicBlock::Thinking {
                    thinking: existing, ..
                } = block
                {
                    existing.push_str(thinking);
                }
            }
            BlockDelta::SignatureDelta { signature } => {
                if let Some(AnthropicBlock::Thinking {
                    signature: existing,
                    ..
                }) = self.blocks.get_mut(&index)
                {
                    existing.push_str(signature);
                }
            }
            BlockDelta::InputJsonDelta { partial_json } => {
                self.partial_json
                    .entry(index)
                    .or_default()
                    .push_str(partial_json);
            }
            BlockDelta::CitationsDelta { citation } => {
                if let Some(AnthropicBlock::Text { citations, .. }) = self.blocks.get_mut(&index) {
                    citations.get_or_insert_with(Vec::new).push(citation.clone());
                }
            }
            BlockDelta::Unknown => {}
        }
    }

    /// Produce the native block list in index order, parsing tool input once.
    #[must_use]
    pub fn finalize(self) -> Vec<AnthropicBlock> {
        let Self {
            blocks,
            mut partial_json,
            ..
        } = self;

        blocks
            .into_iter()
            .filter_map(|(index, block)| match block {
                AnthropicBlock::ToolUse { id, name, input } => {
                    let raw = partial_json.remove(&index).unwrap_or_default();
                    let input = parse_tool_input(&raw, Some(&input), &name);
                    Some(AnthropicBlock::ToolUse { id, name, input })
                }
                AnthropicBlock::ServerToolUse { id, name, input } => {
                    let raw = partial_json.remove(&index).unwrap_or_default();
                    let input = parse_tool_input(&raw, Some(&input), &name);
                    Some(AnthropicBlock::ServerToolUse { id, name, input })
                }
                AnthropicBlock::Unknown => None,
                other => Some(other),
            })
            .collect()
    }
}
