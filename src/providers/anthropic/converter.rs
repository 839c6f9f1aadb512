//! Converts a complete Anthropic response into normalized events.

use crate::normalized::{StreamEvent, TokenUsage};
use crate::providers::empty_object;

use super::mapper::{
    apply_usage, citation_from_value, fetch_result_event, search_result_events, web_input_field,
};
use super::types::{AnthropicBlock, AnthropicResponse, WEB_FETCH_TOOL, WEB_SEARCH_TOOL};

/// Emit the same event sequence the stream mapper produces for equivalent content.
pub fn convert_response(response: &AnthropicResponse) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    for block in &response.content {
        match block {
            AnthropicBlock::Text { text, citations } => {
                events.push(StreamEvent::ContentStart);
                events.extend(
                    citations
                        .iter()
                        .flatten()
                        .filter_map(citation_from_value)
                        .map(StreamEvent::Citation),
                );
                if !text.is_empty() {
                    events.push(StreamEvent::content(text.as_str()));
                }
                events.push(StreamEvent::ContentEnd);
            }
            AnthropicBlock::Thinking { thinking, .. } => {
                events.push(StreamEvent::ThinkingStart);
                if !thinking.is_empty() {
                    events.push(StreamEvent::thinking(thinking.as_str()));
                }
                events.push(StreamEvent::ThinkingEnd);
            }
            AnthropicBlock::RedactedThinking { .. } => {
                events.push(StreamEvent::marker("redacted_thinking"));
            }
            AnthropicBlock::ServerToolUse { id, name, input } if name == WEB_SEARCH_TOOL => {
                events.push(StreamEvent::WebSearchStart { id: id.clone() });
                events.push(StreamEvent::WebSearch {
                    id: id.clone(),
                    query: web_input_field(input, "query").unwrap_or_default(),
                });
            }
            AnthropicBlock::ServerToolUse { id, name, input } if name == WEB_FETCH_TOOL => {
                events.push(StreamEvent::WebFetchStart { id: id.clone() });
                events.push(StreamEvent::WebFetch {
                    id: id.clone(),
                    url: web_input_field(input, "url").unwrap_or_default(),
                });
            }
            AnthropicBlock::ToolUse { id, name, input }
            | AnthropicBlock::ServerToolUse { id, name, input } => {
                events.push(StreamEvent::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: if input.is_null() {
                        empty_object()
                    } else {
                        input.clone()
                    },
                });
            }
            AnthropicBlock::WebSearchToolResult {
                tool_use_id,
                content,
            } => events.extend(search_result_events(tool_use_id, content)),
            AnthropicBlock::WebFetchToolResult {
                tool_use_id,
                content,
            } => events.extend(fetch_result_event(tool_use_id, content)),
            AnthropicBlock::ToolResult { .. } | AnthropicBlock::Unknown => {}
        }
    }

    let mut usage = TokenUsage::default();
    if let Some(raw) = &response.usage {
        apply_usage(&mut usage, raw);
    }
    events.push(StreamEvent::TokenUsage(usage));

    events
}
