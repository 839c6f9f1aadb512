//! `OpenAI` Responses stream event mapper.
//!
//! Message and reasoning items announce themselves with `output_item.added`
//! but say nothing about the block until the first delta, so text and
//! reasoning blocks open on their first non-empty delta. Function calls are
//! keyed by `output_index` and parsed once when their item is done.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::normalized::{Citation, StreamEvent, TokenUsage};
use crate::providers::{Mapped, OpenBlock, parse_tool_input};

use super::types::{OutputItem, ResponsesEvent, ResponsesUsage, WebSearchAction};

/// Mapper state for one in-flight Responses request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponsesState {
    pub open: OpenBlock,
    /// Function calls whose arguments are still streaming, by output index.
    pub pending_calls: BTreeMap<usize, PendingCall>,
    /// Web search calls started but not yet resolved.
    pub pending_searches: BTreeSet<String>,
    /// Reasoning part last written to: output index, summary flag, part index.
    pub reasoning_part: Option<(usize, bool, usize)>,
    pub usage: TokenUsage,
    pub completed: bool,
}

/// A function call being assembled from argument deltas.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    pub item_id: Option<String>,
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

/// Map one Responses event.
pub fn map_event(event: &ResponsesEvent, state: ResponsesState) -> Mapped<ResponsesState> {
    let mut state = state;
    let mut events = Vec::new();

    match event {
        ResponsesEvent::OutputItemAdded { output_index, item } => {
            item_added(*output_index, item, &mut state, &mut events);
        }
        ResponsesEvent::OutputTextDelta { delta, .. } | ResponsesEvent::RefusalDelta { delta, .. } => {
            if !delta.is_empty() {
                state.open = state.open.open(OpenBlock::Text, &mut events);
                events.push(StreamEvent::content(delta.as_str()));
            }
        }
        ResponsesEvent::ReasoningSummaryDelta {
            output_index,
            summary_index,
            delta,
        } => reasoning_delta((*output_index, true, *summary_index), delta, &mut state, &mut events),
        ResponsesEvent::ReasoningTextDelta {
            output_index,
            content_index,
            delta,
        } => reasoning_delta((*output_index, false, *content_index), delta, &mut state, &mut events),
        ResponsesEvent::AnnotationAdded { annotation, .. } => {
            if let Some(citation) = citation_from_annotation(annotation) {
                events.push(StreamEvent::Citation(citation));
            }
        }
        ResponsesEvent::FunctionCallArgumentsDelta {
            output_index,
            item_id,
            delta,
        } => {
            let by_index = state.pending_calls.contains_key(output_index);
            let call = if by_index {
                state.pending_calls.get_mut(output_index)
            } else {
                state
                    .pending_calls
                    .values_mut()
                    .find(|c| c.item_id.is_some() && c.item_id == *item_id)
            };
            match call {
                Some(call) => call.arguments.push_str(delta),
                None => tracing::debug!(output_index, "Dropping arguments for unknown function call"),
            }
        }
        ResponsesEvent::OutputItemDone { output_index, item } => {
            item_done(*output_index, item, &mut state, &mut events);
        }
        ResponsesEvent::Completed { response } | ResponsesEvent::Incomplete { response } => {
            if let Some(usage) = &response.usage {
                state.usage = usage_from(usage);
            }
            complete(&mut state, &mut events);
        }
        ResponsesEvent::Failed { response } => {
            if let Some(usage) = &response.usage {
                state.usage = usage_from(usage);
            }
            tracing::warn!(
                reason = response.error.as_ref().map_or("", |e| e.message.as_str()),
                "Responses stream reported failure"
            );
        }
        ResponsesEvent::Error { code, message } => {
            tracing::warn!(code = ?code, reason = %message, "Responses stream error event");
        }
        ResponsesEvent::Created => {}
        ResponsesEvent::Unknown => {
            tracing::debug!("Ignoring unknown Responses event");
        }
    }

    Mapped::new(events, state)
}

/// End-of-stream hook. A no-op once a terminal response event has been seen.
pub fn finish(state: ResponsesState) -> Mapped<ResponsesState> {
    let mut state = state;
    let mut events = Vec::new();
    if !state.completed {
        complete(&mut state, &mut events);
    }
    Mapped::new(events, state)
}

/// Separates reasoning parts inside one thinking block.
pub(super) const PART_BREAK: &str = "\n\n";

fn reasoning_delta(
    part: (usize, bool, usize),
    delta: &str,
    state: &mut ResponsesState,
    events: &mut Vec<StreamEvent>,
) {
    if delta.is_empty() {
        return;
    }
    if state.open == OpenBlock::Reasoning && state.reasoning_part.is_some_and(|prev| prev != part) {
        events.push(StreamEvent::thinking(PART_BREAK));
    }
    state.open = state.open.open(OpenBlock::Reasoning, events);
    state.reasoning_part = Some(part);
    events.push(StreamEvent::thinking(delta));
}

fn item_added(
    output_index: usize,
    item: &OutputItem,
    state: &mut ResponsesState,
    events: &mut Vec<StreamEvent>,
) {
    match item {
        OutputItem::FunctionCall {
            id,
            call_id,
            name,
            arguments,
        } => {
            state.open = state.open.close(events);
            state.pending_calls.insert(
                output_index,
                PendingCall {
                    item_id: id.clone(),
                    call_id: call_id.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                },
            );
        }
        OutputItem::WebSearchCall { id, .. } => {
            state.open = state.open.close(events);
            events.push(StreamEvent::WebSearchStart { id: id.clone() });
            state.pending_searches.insert(id.clone());
        }
        _ => {}
    }
}

fn item_done(
    output_index: usize,
    item: &OutputItem,
    state: &mut ResponsesState,
    events: &mut Vec<StreamEvent>,
) {
    match item {
        OutputItem::Message { .. } => {
            if state.open == OpenBlock::Text {
                state.open = state.open.close(events);
            }
        }
        OutputItem::Reasoning { .. } => {
            if state.open == OpenBlock::Reasoning {
                state.open = state.open.close(events);
            }
        }
        OutputItem::FunctionCall {
            call_id,
            name,
            arguments,
            ..
        } => {
            state.open = state.open.close(events);
            let streamed = state
                .pending_calls
                .remove(&output_index)
                .map(|c| c.arguments)
                .unwrap_or_default();
            let raw = if arguments.is_empty() {
                streamed.as_str()
            } else {
                arguments.as_str()
            };
            events.push(StreamEvent::ToolUse {
                id: call_id.clone(),
                name: name.clone(),
                input: parse_tool_input(raw, None, name),
            });
        }
        OutputItem::WebSearchCall { id, action, .. } => {
            state.open = state.open.close(events);
            if !state.pending_searches.remove(id) {
                events.push(StreamEvent::WebSearchStart { id: id.clone() });
            }
            events.extend(search_events(id, action.as_ref()));
        }
        OutputItem::FunctionCallOutput { .. } | OutputItem::Unknown => {}
    }
}

fn complete(state: &mut ResponsesState, events: &mut Vec<StreamEvent>) {
    state.open = state.open.close(events);
    for (_, call) in std::mem::take(&mut state.pending_calls) {
        events.push(StreamEvent::ToolUse {
            input: parse_tool_input(&call.arguments, None, &call.name),
            id: call.call_id,
            name: call.name,
        });
    }
    for id in std::mem::take(&mut state.pending_searches) {
        tracing::debug!(id = %id, "Web search never resolved");
    }
    events.push(StreamEvent::TokenUsage(state.usage));
    state.completed = true;
}

/// Resolution events for a finished web search call.
pub(super) fn search_events(id: &str, action: Option<&WebSearchAction>) -> Vec<StreamEvent> {
    let Some(action) = action else {
        return Vec::new();
    };
    let mut events = vec![StreamEvent::WebSearch {
        id: id.to_string(),
        query: action.query.clone().unwrap_or_default(),
    }];
    events.extend(action.sources.iter().map(|source| StreamEvent::WebSearchResult {
        tool_use_id: id.to_string(),
        title: source.title.clone(),
        url: source.url.clone(),
    }));
    events
}

/// `url_citation` annotations become citations; file citations are skipped.
pub(super) fn citation_from_annotation(annotation: &Value) -> Option<Citation> {
    if annotation.get("type").and_then(Value::as_str) != Some("url_citation") {
        return None;
    }
    Some(Citation {
        url: annotation.get("url")?.as_str()?.to_string(),
        title: annotation
            .get("title")
            .and_then(Value::as_str)
            .map(ToString::to_string),
        cited_text: None,
    })
}

/// Normalize Responses usage; the headline input count includes cached reads.
pub(super) fn usage_from(raw: &ResponsesUsage) -> TokenUsage {
    let cached = raw.input_tokens_details.and_then(|d| d.cached_tokens);
    TokenUsage {
        input_tokens: TokenUsage::fresh_input(raw.input_tokens, cached),
        output_tokens: raw.output_tokens,
        reasoning_tokens: raw.output_tokens_details.and_then(|d| d.reasoning_tokens),
        cache_read_tokens: cached,
        cache_creation_tokens: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(lines: &[&str]) -> (Vec<StreamEvent>, ResponsesState) {
        let mut state = ResponsesState::default();
        let mut out = Vec::new();
        for line in lines {
            let event: ResponsesEvent = serde_json::from_str(line).unwrap();
            let step = map_event(&event, state);
            out.extend(step.events);
            state = step.state;
        }
        (out, state)
    }

    #[test]
    fn test_reasoning_then_text_opens_on_first_delta() {
        let (events, _) = run(&[
            r#"{"type":"response.output_item.added","output_index":0,"item":{"type":"reasoning","id":"rs_1","summary":[]}}"#,
            r#"{"type":"response.reasoning_summary_text.delta","output_index":0,"summary_index":0,"delta":"think"}"#,
            r#"{"type":"response.output_item.done","output_index":0,"item":{"type":"reasoning","id":"rs_1","summary":[{"type":"summary_text","text":"think"}]}}"#,
            r#"{"type":"response.output_item.added","output_index":1,"item":{"type":"message","id":"msg_1","role":"assistant","content":[]}}"#,
            r#"{"type":"response.output_text.delta","output_index":1,"content_index":0,"delta":""}"#,
            r#"{"type":"response.output_text.delta","output_index":1,"content_index":0,"delta":"ok"}"#,
        ]);
        assert_eq!(
            events,
            vec![
                StreamEvent::ThinkingStart,
                StreamEvent::thinking("think"),
                StreamEvent::ThinkingEnd,
                StreamEvent::ContentStart,
                StreamEvent::content("ok"),
            ]
        );
    }

    #[test]
    fn test_summary_parts_are_separated() {
        let (events, _) = run(&[
            r#"{"type":"response.reasoning_summary_text.delta","output_index":0,"summary_index":0,"delta":"A"}"#,
            r#"{"type":"response.reasoning_summary_text.delta","output_index":0,"summary_index":0,"delta":"a"}"#,
            r#"{"type":"response.reasoning_summary_text.delta","output_index":0,"summary_index":1,"delta":"B"}"#,
            r#"{"type":"response.output_item.done","output_index":0,"item":{"type":"reasoning","id":"rs_1","summary":[{"type":"summary_text","text":"Aa"},{"type":"summary_text","text":"B"}]}}"#,
        ]);
        assert_eq!(
            events,
            vec![
                StreamEvent::ThinkingStart,
                StreamEvent::thinking("A"),
                StreamEvent::thinking("a"),
                StreamEvent::thinking(PART_BREAK),
                StreamEvent::thinking("B"),
                StreamEvent::ThinkingEnd,
            ]
        );
    }

    #[test]
    fn test_function_call_parsed_at_done() {
        let (events, state) = run(&[
            r#"{"type":"response.output_item.added","output_index":0,"item":{"type":"function_call","id":"fc_1","call_id":"call_1","name":"filesystem","arguments":""}}"#,
            r#"{"type":"response.function_call_arguments.delta","output_index":0,"item_id":"fc_1","delta":"{\"path\":"}"#,
            r#"{"type":"response.function_call_arguments.delta","output_index":0,"item_id":"fc_1","delta":"\"/\"}"}"#,
        ]);
        assert!(events.is_empty());
        assert_eq!(state.pending_calls[&0].arguments, r#"{"path":"/"}"#);

        let done: ResponsesEvent = serde_json::from_str(
            r#"{"type":"response.output_item.done","output_index":0,"item":{"type":"function_call","id":"fc_1","call_id":"call_1","name":"filesystem","arguments":""}}"#,
        )
        .unwrap();
        let step = map_event(&done, state);
        assert_eq!(
            step.events,
            vec![StreamEvent::ToolUse {
                id: "call_1".to_string(),
                name: "filesystem".to_string(),
                input: serde_json::json!({"path": "/"}),
            }]
        );
        assert!(step.state.pending_calls.is_empty());
    }

    #[test]
    fn test_web_search_call() {
        let (events, state) = run(&[
            r#"{"type":"response.output_item.added","output_index":0,"item":{"type":"web_search_call","id":"ws_1","status":"in_progress"}}"#,
            r#"{"type":"response.output_item.done","output_index":0,"item":{"type":"web_search_call","id":"ws_1","status":"completed","action":{"type":"search","query":"weather","sources":[{"url":"U","title":"T"}]}}}"#,
        ]);
        assert_eq!(
            events,
            vec![
                StreamEvent::WebSearchStart { id: "ws_1".to_string() },
                StreamEvent::WebSearch {
                    id: "ws_1".to_string(),
                    query: "weather".to_string()
                },
                StreamEvent::WebSearchResult {
                    tool_use_id: "ws_1".to_string(),
                    title: Some("T".to_string()),
                    url: Some("U".to_string()),
                },
            ]
        );
        assert!(state.pending_searches.is_empty());
    }

    #[test]
    fn test_completed_subtracts_cached_tokens() {
        let (events, state) = run(&[
            r#"{"type":"response.output_text.delta","delta":"hi"}"#,
            r#"{"type":"response.completed","response":{"id":"r","status":"completed","output":[],"usage":{"input_tokens":100,"output_tokens":9,"input_tokens_details":{"cached_tokens":20},"output_tokens_details":{"reasoning_tokens":3}}}}"#,
        ]);
        assert_eq!(
            events,
            vec![
                StreamEvent::ContentStart,
                StreamEvent::content("hi"),
                StreamEvent::ContentEnd,
                StreamEvent::TokenUsage(TokenUsage {
                    input_tokens: Some(80),
                    output_tokens: Some(9),
                    reasoning_tokens: Some(3),
                    cache_read_tokens: Some(20),
                    cache_creation_tokens: None,
                }),
            ]
        );
        assert!(state.completed);
    }

    #[test]
    fn test_url_citation_annotation() {
        let (events, _) = run(&[
            r#"{"type":"response.output_text.annotation.added","annotation":{"type":"url_citation","url":"https://x.example","title":"X","start_index":0,"end_index":3}}"#,
            r#"{"type":"response.output_text.annotation.added","annotation":{"type":"file_citation","file_id":"f"}}"#,
        ]);
        assert_eq!(
            events,
            vec![StreamEvent::Citation(Citation {
                url: "https://x.example".to_string(),
                title: Some("X".to_string()),
                cited_text: None,
            })]
        );
    }

    #[test]
    fn test_finish_flushes_pending_call() {
        let (_, state) = run(&[
            r#"{"type":"response.output_item.added","output_index":2,"item":{"type":"function_call","call_id":"c","name":"n","arguments":""}}"#,
            r#"{"type":"response.function_call_arguments.delta","output_index":2,"delta":"{\"a\":1"}"#,
        ]);
        let step = finish(state);
        assert_eq!(
            step.events[0],
            StreamEvent::ToolUse {
                id: "c".to_string(),
                name: "n".to_string(),
                input: serde_json::json!({}),
            }
        );
        assert!(matches!(step.events[1], StreamEvent::TokenUsage(_)));
    }
}
