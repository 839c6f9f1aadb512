//! Anthropic stream event mapper.
//!
//! Anthropic declares every block's type in `content_block_start`, so text
//! and thinking `.start` events are emitted immediately. Deltas that arrive
//! without a declared block still open one (start-on-first-delta).

use std::collections::BTreeMap;

use serde_json::Value;

use crate::normalized::{Citation, StreamEvent, TokenUsage};
use crate::providers::{Mapped, OpenBlock, json_string_field, parse_tool_input};

use super::types::{
    AnthropicBlock, AnthropicEvent, AnthropicUsage, BlockDelta, WEB_FETCH_TOOL, WEB_SEARCH_TOOL,
};

/// Mapper state for one in-flight Anthropic request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnthropicState {
    /// Display block currently open.
    pub open: OpenBlock,
    /// Client tool call whose arguments are still streaming.
    pub pending_tool: Option<PendingTool>,
    /// Hosted web tool calls awaiting their query or URL, by tool id.
    pub pending_web: BTreeMap<String, PendingWeb>,
    /// Running token counters.
    pub usage: TokenUsage,
    /// Whether the terminal event has been processed.
    pub completed: bool,
}

/// A tool invocation being assembled from `input_json_delta` fragments.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTool {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub partial_json: String,
    pub initial_input: Value,
}

/// Which hosted web tool a pending call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebTool {
    Search,
    Fetch,
}

/// A hosted web tool call awaiting its query or URL.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWeb {
    pub index: usize,
    pub tool: WebTool,
    pub partial_json: String,
    pub initial_input: Value,
}

/// Map one Anthropic event. The previous state is consumed; the successor is returned.
pub fn map_event(event: &AnthropicEvent, state: AnthropicState) -> Mapped<AnthropicState> {
    let mut state = state;
    let mut events = Vec::new();

    match event {
        AnthropicEvent::MessageStart { message } => {
            if let Some(usage) = &message.usage {
                apply_usage(&mut state.usage, usage);
            }
        }
        AnthropicEvent::ContentBlockStart {
            index,
            content_block,
        } => start_block(*index, content_block, &mut state, &mut events),
        AnthropicEvent::ContentBlockDelta { index, delta } => {
            apply_delta(*index, delta, &mut state, &mut events);
        }
        AnthropicEvent::ContentBlockStop { index } => stop_block(*index, &mut state, &mut events),
        AnthropicEvent::MessageDelta { usage, .. } => {
            if let Some(usage) = usage {
                apply_usage(&mut state.usage, usage);
            }
        }
        AnthropicEvent::MessageStop => complete(&mut state, &mut events),
        AnthropicEvent::Error { error } => {
            tracing::warn!(kind = %error.kind, reason = %error.message, "Anthropic stream error event");
            events.push(StreamEvent::marker("error"));
        }
        AnthropicEvent::Ping => {}
        AnthropicEvent::Unknown => {
            tracing::debug!("Ignoring unknown Anthropic event");
        }
    }

    Mapped::new(events, state)
}

/// End-of-stream hook. A no-op once `message_stop` has been seen.
pub fn finish(state: AnthropicState) -> Mapped<AnthropicState> {
    let mut state = state;
    let mut events = Vec::new();
    if !state.completed {
        complete(&mut state, &mut events);
    }
    Mapped::new(events, state)
}

fn start_block(
    index: usize,
    block: &AnthropicBlock,
    state: &mut AnthropicState,
    events: &mut Vec<StreamEvent>,
) {
    match block {
        AnthropicBlock::Text { text, citations } => {
            state.open = state.open.open(OpenBlock::Text, events);
            for citation in citations.iter().flatten().filter_map(citation_from_value) {
                events.push(StreamEvent::Citation(citation));
            }
            if !text.is_empty() {
                events.push(StreamEvent::content(text.as_str()));
            }
        }
        AnthropicBlock::Thinking { thinking, .. } => {
            state.open = state.open.open(OpenBlock::Reasoning, events);
            if !thinking.is_empty() {
                events.push(StreamEvent::thinking(thinking.as_str()));
            }
        }
        AnthropicBlock::RedactedThinking { .. } => {
            state.open = state.open.close(events);
            events.push(StreamEvent::marker("redacted_thinking"));
        }
        AnthropicBlock::ToolUse { id, name, input } => {
            state.open = state.open.close(events);
            state.pending_tool = Some(PendingTool {
                index,
                id: id.clone(),
                name: name.clone(),
                partial_json: String::new(),
                initial_input: input.clone(),
            });
        }
        AnthropicBlock::ServerToolUse { id, name, input } => {
            state.open = state.open.close(events);
            let tool = match name.as_str() {
                WEB_SEARCH_TOOL => Some(WebTool::Search),
                WEB_FETCH_TOOL => Some(WebTool::Fetch),
                _ => None,
            };
            match tool {
                Some(tool) => {
                    events.push(match tool {
                        WebTool::Search => StreamEvent::WebSearchStart { id: id.clone() },
                        WebTool::Fetch => StreamEvent::WebFetchStart { id: id.clone() },
                    });
                    state.pending_web.insert(
                        id.clone(),
                        PendingWeb {
                            index,
                            tool,
                            partial_json: String::new(),
                            initial_input: input.clone(),
                        },
                    );
                }
                None => {
                    state.pending_tool = Some(PendingTool {
                        index,
                        id: id.clone(),
                        name: name.clone(),
                        partial_json: String::new(),
                        initial_input: input.clone(),
                    });
                }
            }
        }
        AnthropicBlock::WebSearchToolResult {
            tool_use_id,
            content,
        } => {
            state.open = state.open.close(events);
            events.extend(search_result_events(tool_use_id, content));
        }
        AnthropicBlock::WebFetchToolResult {
            tool_use_id,
            content,
        } => {
            state.open = state.open.close(events);
            events.extend(fetch_result_event(tool_use_id, content));
        }
        AnthropicBlock::ToolResult { .. } | AnthropicBlock::Unknown => {
            tracing::debug!(index, "Ignoring non-display Anthropic block");
        }
    }
}

fn apply_delta(
    index: usize,
    delta: &BlockDelta,
    state: &mut AnthropicState,
    events: &mut Vec<StreamEvent>,
) {
    match delta {
        BlockDelta::TextDelta { text } => {
            if text.is_empty() {
                return;
            }
            state.open = state.open.open(OpenBlock::Text, events);
            events.push(StreamEvent::content(text.as_str()));
        }
        BlockDelta::ThinkingDelta { thinking } => {
            if thinking.is_empty() {
                return;
            }
            state.open = state.open.open(OpenBlock::Reasoning, events);
            events.push(StreamEvent::thinking(thinking.as_str()));
        }
        BlockDelta::InputJsonDelta { partial_json } => {
            if let Some(tool) = state.pending_tool.as_mut().filter(|t| t.index == index) {
                tool.partial_json.push_str(partial_json);
            } else if let Some(web) = state.pending_web.values_mut().find(|w| w.index == index) {
                web.partial_json.push_str(partial_json);
            } else {
                tracing::debug!(index, "Dropping input_json_delta for unknown block");
            }
        }
        BlockDelta::CitationsDelta { citation } => {
            if let Some(citation) = citation_from_value(citation) {
                events.push(StreamEvent::Citation(citation));
            }
        }
        BlockDelta::SignatureDelta { .. } | BlockDelta::Unknown => {}
    }
}

fn stop_block(index: usize, state: &mut AnthropicState, events: &mut Vec<StreamEvent>) {
    if state.pending_tool.as_ref().is_some_and(|t| t.index == index) {
        if let Some(tool) = state.pending_tool.take() {
            events.push(flush_tool(tool));
        }
        return;
    }

    let web_id = state
        .pending_web
        .iter()
        .find(|(_, w)| w.index == index)
        .map(|(id, _)| id.clone());
    if let Some(id) = web_id {
        if let Some(web) = state.pending_web.remove(&id) {
            events.push(resolve_web(id, &web));
        }
        return;
    }

    state.open = state.open.close(events);
}

fn complete(state: &mut AnthropicState, events: &mut Vec<StreamEvent>) {
    state.open = state.open.close(events);
    if let Some(tool) = state.pending_tool.take() {
        events.push(flush_tool(tool));
    }
    for (id, web) in std::mem::take(&mut state.pending_web) {
        events.push(resolve_web(id, &web));
    }
    events.push(StreamEvent::TokenUsage(state.usage));
    state.completed = true;
}

fn flush_tool(tool: PendingTool) -> StreamEvent {
    let input = parse_tool_input(&tool.partial_json, Some(&tool.initial_input), &tool.name);
    StreamEvent::ToolUse {
        id: tool.id,
        name: tool.name,
        input,
    }
}

fn resolve_web(id: String, web: &PendingWeb) -> StreamEvent {
    let field = match web.tool {
        WebTool::Search => "query",
        WebTool::Fetch => "url",
    };
    let value = json_string_field(&web.partial_json, field)
        .or_else(|| web_input_field(&web.initial_input, field))
        .unwrap_or_default();
    match web.tool {
        WebTool::Search => StreamEvent::WebSearch { id, query: value },
        WebTool::Fetch => StreamEvent::WebFetch { id, url: value },
    }
}

pub(super) fn web_input_field(input: &Value, field: &str) -> Option<String> {
    input.get(field)?.as_str().map(ToString::to_string)
}

/// Fold an Anthropic usage block into the running counters.
pub(super) fn apply_usage(usage: &mut TokenUsage, raw: &AnthropicUsage) {
    if raw.input_tokens.is_some() {
        usage.input_tokens = raw.input_tokens;
    }
    if raw.output_tokens.is_some() {
        usage.output_tokens = raw.output_tokens;
    }
    if raw.cache_read_input_tokens.is_some() {
        usage.cache_read_tokens = raw.cache_read_input_tokens;
    }
    if raw.cache_creation_input_tokens.is_some() {
        usage.cache_creation_tokens = raw.cache_creation_input_tokens;
    }
}

/// Citations with a URL (web search result locations); document citations are skipped.
pub(super) fn citation_from_value(value: &Value) -> Option<Citation> {
    let url = value.get("url")?.as_str()?.to_string();
    let text_field = |key: &str| value.get(key).and_then(Value::as_str).map(ToString::to_string);
    Some(Citation {
        url,
        title: text_field("title"),
        cited_text: text_field("cited_text"),
    })
}

pub(super) fn search_result_events(tool_use_id: &str, content: &Value) -> Vec<StreamEvent> {
    let Some(results) = content.as_array() else {
        tracing::debug!(tool_use_id = %tool_use_id, "Web search returned no result list");
        return Vec::new();
    };
    results
        .iter()
        .filter(|r| r.get("type").and_then(Value::as_str) == Some("web_search_result"))
        .map(|r| StreamEvent::WebSearchResult {
            tool_use_id: tool_use_id.to_string(),
            title: r.get("title").and_then(Value::as_str).map(ToString::to_string),
            url: r.get("url").and_then(Value::as_str).map(ToString::to_string),
        })
        .collect()
}

pub(super) fn fetch_result_event(tool_use_id: &str, content: &Value) -> Option<StreamEvent> {
    if content.get("type").and_then(Value::as_str) != Some("web_fetch_result") {
        return None;
    }
    Some(StreamEvent::WebFetchResult {
        tool_use_id: tool_use_id.to_string(),
        url: content
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        title: content
            .pointer("/content/title")
            .and_then(Value::as_str)
            .map(ToString::to_string),
    })
}
