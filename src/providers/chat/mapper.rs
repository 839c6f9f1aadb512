//! Chat Completions stream event mapper.
//!
//! Nothing on this wire declares a block: text and reasoning open on their
//! first non-empty delta, and tool calls accumulate per `index` until the
//! choice finishes.

use std::collections::BTreeMap;

use crate::normalized::{StreamEvent, TokenUsage};
use crate::providers::{Mapped, OpenBlock, parse_tool_input};

use super::fallback_call_id;
use super::types::{ChatChunk, ChatEvent, ChatUsage, ToolCallDelta};

/// Mapper state for one in-flight Chat Completions request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    pub open: OpenBlock,
    /// Tool calls in flight, by tool call index.
    pub pending_tools: BTreeMap<usize, PendingCall>,
    pub usage: TokenUsage,
    pub completed: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingCall {
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

/// Map one Chat Completions frame.
pub fn map_event(event: &ChatEvent, state: ChatState) -> Mapped<ChatState> {
    let mut state = state;
    let mut events = Vec::new();

    match event {
        ChatEvent::Chunk(chunk) => map_chunk(chunk, &mut state, &mut events),
        ChatEvent::Done => complete(&mut state, &mut events),
    }

    Mapped::new(events, state)
}

/// End-of-stream hook. A no-op once `[DONE]` has been seen.
pub fn finish(state: ChatState) -> Mapped<ChatState> {
    let mut state = state;
    let mut events = Vec::new();
    if !state.completed {
        complete(&mut state, &mut events);
    }
    Mapped::new(events, state)
}

fn map_chunk(chunk: &ChatChunk, state: &mut ChatState, events: &mut Vec<StreamEvent>) {
    if let Some(usage) = &chunk.usage {
        state.usage = usage_from(usage);
    }
    let Some(choice) = chunk.choices.first() else {
        return;
    };
    let delta = &choice.delta;

    if let Some(reasoning) = delta.reasoning_text().filter(|t| !t.is_empty()) {
        state.open = state.open.open(OpenBlock::Reasoning, events);
        events.push(StreamEvent::thinking(reasoning));
    }
    if let Some(text) = delta.content.as_deref().filter(|t| !t.is_empty()) {
        state.open = state.open.open(OpenBlock::Text, events);
        events.push(StreamEvent::content(text));
    }
    if let Some(calls) = delta.tool_calls.as_deref().filter(|c| !c.is_empty()) {
        state.open = state.open.close(events);
        for call in calls {
            accumulate_call(call, &mut state.pending_tools);
        }
    }

    if choice.finish_reason.is_some() {
        close_all(state, events);
    }
}

fn accumulate_call(call: &ToolCallDelta, pending: &mut BTreeMap<usize, PendingCall>) {
    let entry = pending.entry(call.index).or_default();
    if entry.id.is_none() {
        entry.id.clone_from(&call.id);
    }
    if let Some(function) = &call.function {
        if entry.name.is_none() {
            entry.name.clone_from(&function.name);
        }
        if let Some(arguments) = &function.arguments {
            entry.arguments.push_str(arguments);
        }
    }
}

fn close_all(state: &mut ChatState, events: &mut Vec<StreamEvent>) {
    state.open = state.open.close(events);
    for (index, call) in std::mem::take(&mut state.pending_tools) {
        let Some(name) = call.name else {
            tracing::warn!(index, "Dropping tool call without a function name");
            continue;
        };
        let id = call.id.unwrap_or_else(|| {
            tracing::debug!(index, "Tool call streamed without an id");
            fallback_call_id(index)
        });
        events.push(StreamEvent::ToolUse {
            input: parse_tool_input(&call.arguments, None, &name),
            id,
            name,
        });
    }
}

fn complete(state: &mut ChatState, events: &mut Vec<StreamEvent>) {
    close_all(state, events);
    events.push(StreamEvent::TokenUsage(state.usage));
    state.completed = true;
}

/// Normalize Chat usage; `prompt_tokens` includes cached reads.
pub(super) fn usage_from(raw: &ChatUsage) -> TokenUsage {
    let cached = raw.prompt_tokens_details.and_then(|d| d.cached_tokens);
    TokenUsage {
        input_tokens: TokenUsage::fresh_input(raw.prompt_tokens, cached),
        output_tokens: raw.completion_tokens,
        reasoning_tokens: raw
            .completion_tokens_details
            .and_then(|d| d.reasoning_tokens),
        cache_read_tokens: cached,
        cache_creation_tokens: None,
    }
}
