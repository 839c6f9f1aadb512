//! Bedrock Converse stream event mapper.
//!
//! Converse only declares tool blocks at `contentBlockStart`; text and
//! reasoning blocks reveal themselves through their first delta.

use std::collections::BTreeMap;

use crate::normalized::{StreamEvent, TokenUsage};
use crate::providers::{Mapped, OpenBlock, parse_tool_input};

use super::types::{BedrockEvent, BedrockUsage, BlockDelta};

/// Mapper state for one in-flight Converse request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BedrockState {
    pub open: OpenBlock,
    /// Tool calls whose input is still streaming, by content block index.
    pub pending_tools: BTreeMap<usize, PendingTool>,
    pub usage: TokenUsage,
    /// `messageStop` seen; usage may still follow in `metadata`.
    pub stopped: bool,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingTool {
    pub id: String,
    pub name: String,
    pub input: String,
}

/// Map one Converse event.
pub fn map_event(event: &BedrockEvent, state: BedrockState) -> Mapped<BedrockState> {
    let mut state = state;
    let mut events = Vec::new();

    match event {
        BedrockEvent::MessageStart(_) => {}
        BedrockEvent::ContentBlockStart(start) => {
            if let Some(tool) = start.start.as_ref().and_then(|s| s.tool_use.as_ref()) {
                state.open = state.open.close(&mut events);
                state.pending_tools.insert(
                    start.content_block_index,
                    PendingTool {
                        id: tool.tool_use_id.clone(),
                        name: tool.name.clone(),
                        input: String::new(),
                    },
                );
            }
        }
        BedrockEvent::ContentBlockDelta(delta) => {
            apply_delta(delta.content_block_index, &delta.delta, &mut state, &mut events);
        }
        BedrockEvent::ContentBlockStop(stop) => {
            match state.pending_tools.remove(&stop.content_block_index) {
                Some(tool) => events.push(flush_tool(tool)),
                None => state.open = state.open.close(&mut events),
            }
        }
        BedrockEvent::MessageStop(_) => {
            close_all(&mut state, &mut events);
            state.stopped = true;
        }
        BedrockEvent::Metadata(metadata) => {
            if let Some(usage) = &metadata.usage {
                state.usage = usage_from(usage);
            }
            complete(&mut state, &mut events);
        }
        BedrockEvent::Exception { kind, message } => {
            tracing::warn!(kind = %kind, reason = %message, "Bedrock stream exception");
        }
    }

    Mapped::new(events, state)
}

/// End-of-stream hook. A no-op once `metadata` has been seen.
pub fn finish(state: BedrockState) -> Mapped<BedrockState> {
    let mut state = state;
    let mut events = Vec::new();
    if !state.completed {
        complete(&mut state, &mut events);
    }
    Mapped::new(events, state)
}

fn apply_delta(
    index: usize,
    delta: &BlockDelta,
    state: &mut BedrockState,
    events: &mut Vec<StreamEvent>,
) {
    if let Some(text) = delta.text.as_deref().filter(|t| !t.is_empty()) {
        state.open = state.open.open(OpenBlock::Text, events);
        events.push(StreamEvent::content(text));
    }
    if let Some(reasoning) = &delta.reasoning_content {
        if let Some(text) = reasoning.text.as_deref().filter(|t| !t.is_empty()) {
            state.open = state.open.open(OpenBlock::Reasoning, events);
            events.push(StreamEvent::thinking(text));
        }
    }
    if let Some(tool) = &delta.tool_use {
        match state.pending_tools.get_mut(&index) {
            Some(pending) => pending.input.push_str(&tool.input),
            None => tracing::debug!(index, "Dropping tool input for undeclared block"),
        }
    }
}

fn close_all(state: &mut BedrockState, events: &mut Vec<StreamEvent>) {
    state.open = state.open.close(events);
    for (_, tool) in std::mem::take(&mut state.pending_tools) {
        events.push(flush_tool(tool));
    }
}

fn complete(state: &mut BedrockState, events: &mut Vec<StreamEvent>) {
    close_all(state, events);
    events.push(StreamEvent::TokenUsage(state.usage));
    state.completed = true;
}

fn flush_tool(tool: PendingTool) -> StreamEvent {
    let input = parse_tool_input(&tool.input, None, &tool.name);
    StreamEvent::ToolUse {
        id: tool.id,
        name: tool.name,
        input,
    }
}

/// Normalize Converse usage; `inputTokens` is already fresh input.
pub(super) fn usage_from(raw: &BedrockUsage) -> TokenUsage {
    TokenUsage {
        input_tokens: raw.input_tokens,
        output_tokens: raw.output_tokens,
        reasoning_tokens: None,
        cache_read_tokens: raw.cache_read_input_tokens,
        cache_creation_tokens: raw.cache_write_input_tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str, body: serde_json::Value) -> BedrockEvent {
        BedrockEvent::from_named(name, body).unwrap().unwrap()
    }

    fn run(events: Vec<BedrockEvent>) -> (Vec<StreamEvent>, BedrockState) {
        let mut state = BedrockState::default();
        let mut out = Vec::new();
        for event in &events {
            let step = map_event(event, state);
            out.extend(step.events);
            state = step.state;
        }
        (out, state)
    }

    #[test]
    fn test_reasoning_text_and_tool() {
        let (events, state) = run(vec![
            event("messageStart", json!({"role": "assistant"})),
            event("contentBlockDelta", json!({"contentBlockIndex": 0, "delta": {"reasoningContent": {"text": "hmm"}}})),
            event("contentBlockDelta", json!({"contentBlockIndex": 0, "delta": {"reasoningContent": {"signature": "sig"}}})),
            event("contentBlockStop", json!({"contentBlockIndex": 0})),
            event("contentBlockDelta", json!({"contentBlockIndex": 1, "delta": {"text": "ok"}})),
            event("contentBlockStop", json!({"contentBlockIndex": 1})),
            event("contentBlockStart", json!({"contentBlockIndex": 2, "start": {"toolUse": {"toolUseId": "t1", "name": "filesystem"}}})),
            event("contentBlockDelta", json!({"contentBlockIndex": 2, "delta": {"toolUse": {"input": "{\"path\""}}})),
            event("contentBlockDelta", json!({"contentBlockIndex": 2, "delta": {"toolUse": {"input": ":\"/\"}"}}})),
            event("contentBlockStop", json!({"contentBlockIndex": 2})),
            event("messageStop", json!({"stopReason": "tool_use"})),
        ]);
        assert_eq!(
            events,
            vec![
                StreamEvent::ThinkingStart,
                StreamEvent::thinking("hmm"),
                StreamEvent::ThinkingEnd,
                StreamEvent::ContentStart,
                StreamEvent::content("ok"),
                StreamEvent::ContentEnd,
                StreamEvent::ToolUse {
                    id: "t1".to_string(),
                    name: "filesystem".to_string(),
                    input: json!({"path": "/"}),
                },
            ]
        );
        assert!(state.stopped);
        assert!(!state.completed);
    }

    #[test]
    fn test_metadata_reports_usage_after_stop() {
        let (events, state) = run(vec![
            event("contentBlockDelta", json!({"contentBlockIndex": 0, "delta": {"text": "x"}})),
            event("messageStop", json!({"stopReason": "end_turn"})),
            event("metadata", json!({"usage": {"inputTokens": 5, "outputTokens": 2, "totalTokens": 7, "cacheReadInputTokens": 40}})),
        ]);
        assert_eq!(
            events,
            vec![
                StreamEvent::ContentStart,
                StreamEvent::content("x"),
                StreamEvent::ContentEnd,
                StreamEvent::TokenUsage(TokenUsage {
                    input_tokens: Some(5),
                    output_tokens: Some(2),
                    cache_read_tokens: Some(40),
                    ..TokenUsage::default()
                }),
            ]
        );
        assert!(finish(state).events.is_empty());
    }

    #[test]
    fn test_finish_without_metadata_emits_usage() {
        let (_, state) = run(vec![event(
            "contentBlockDelta",
            json!({"contentBlockIndex": 0, "delta": {"reasoningContent": {"text": "a"}}}),
        )]);
        let step = finish(state);
        assert_eq!(
            step.events,
            vec![
                StreamEvent::ThinkingEnd,
                StreamEvent::TokenUsage(TokenUsage::default())
            ]
        );
    }

    #[test]
    fn test_unknown_event_name() {
        assert!(BedrockEvent::from_named("somethingNew", json!({})).unwrap().is_none());
    }
}
