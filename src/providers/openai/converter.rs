//! Converts a complete Responses body into normalized events.

use crate::normalized::{StreamEvent, TokenUsage};
use crate::providers::parse_tool_input;

use super::mapper::{PART_BREAK, citation_from_annotation, search_events, usage_from};
use super::types::{MessagePart, OutputItem, ReasoningPart, ResponsesResponse};

/// Walk the output items in order, emitting what the stream mapper would.
pub fn convert_response(response: &ResponsesResponse) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    for item in &response.output {
        match item {
            OutputItem::Message { content, .. } => {
                for part in content {
                    let (text, annotations) = match part {
                        MessagePart::OutputText { text, annotations } => {
                            (text.as_str(), annotations.as_slice())
                        }
                        MessagePart::Refusal { refusal } => (refusal.as_str(), &[][..]),
                        MessagePart::Unknown => continue,
                    };
                    events.push(StreamEvent::ContentStart);
                    if !text.is_empty() {
                        events.push(StreamEvent::content(text));
                    }
                    events.extend(
                        annotations
                            .iter()
                            .filter_map(citation_from_annotation)
                            .map(StreamEvent::Citation),
                    );
                    events.push(StreamEvent::ContentEnd);
                }
            }
            OutputItem::Reasoning {
                summary, content, ..
            } => {
                let mut parts = summary
                    .iter()
                    .chain(content)
                    .map(ReasoningPart::text)
                    .filter(|text| !text.is_empty())
                    .peekable();
                if parts.peek().is_some() {
                    events.push(StreamEvent::ThinkingStart);
                    for (i, text) in parts.enumerate() {
                        if i > 0 {
                            events.push(StreamEvent::thinking(PART_BREAK));
                        }
                        events.push(StreamEvent::thinking(text));
                    }
                    events.push(StreamEvent::ThinkingEnd);
                }
            }
            OutputItem::FunctionCall {
                call_id,
                name,
                arguments,
                ..
            } => events.push(StreamEvent::ToolUse {
                id: call_id.clone(),
                name: name.clone(),
                input: parse_tool_input(arguments, None, name),
            }),
            OutputItem::WebSearchCall { id, action, .. } => {
                events.push(StreamEvent::WebSearchStart { id: id.clone() });
                events.extend(search_events(id, action.as_ref()));
            }
            OutputItem::FunctionCallOutput { .. } | OutputItem::Unknown => {}
        }
    }

    let usage = response
        .usage
        .as_ref()
        .map(usage_from)
        .unwrap_or_default();
    events.push(StreamEvent::TokenUsage(usage));

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_converts_output_items() {
        let response: ResponsesResponse = serde_json::from_value(json!({
            "id": "resp_1",
            "status": "completed",
            "output": [
                {"type": "reasoning", "id": "rs", "summary": [{"type": "summary_text", "text": "plan"}]},
                {"type": "message", "role": "assistant", "content": [
                    {"type": "output_text", "text": "see", "annotations": [
                        {"type": "url_citation", "url": "https://d.example", "title": "D"}
                    ]}
                ]},
                {"type": "function_call", "call_id": "c1", "name": "calc", "arguments": "{\"x\":2}"}
            ],
            "usage": {"input_tokens": 100, "output_tokens": 5, "input_tokens_details": {"cached_tokens": 20}}
        }))
        .unwrap();

        let events = convert_response(&response);
        assert_eq!(events[0], StreamEvent::ThinkingStart);
        assert_eq!(events[1], StreamEvent::thinking("plan"));
        assert_eq!(events[3], StreamEvent::ContentStart);
        assert_eq!(events[4], StreamEvent::content("see"));
        assert!(matches!(&events[5], StreamEvent::Citation(c) if c.url == "https://d.example"));
        assert_eq!(
            events[7],
            StreamEvent::ToolUse {
                id: "c1".to_string(),
                name: "calc".to_string(),
                input: json!({"x": 2}),
            }
        );
        assert_eq!(
            events[8],
            StreamEvent::TokenUsage(TokenUsage {
                input_tokens: Some(80),
                output_tokens: Some(5),
                cache_read_tokens: Some(20),
                ..TokenUsage::default()
            })
        );
    }

    #[test]
    fn test_reasoning_parts_share_one_block() {
        let response: ResponsesResponse = serde_json::from_value(json!({
            "output": [{"type": "reasoning", "id": "rs", "summary": [
                {"type": "summary_text", "text": "first"},
                {"type": "summary_text", "text": ""},
                {"type": "summary_text", "text": "second"}
            ]}]
        }))
        .unwrap();

        let events = convert_response(&response);
        assert_eq!(
            events[..5],
            [
                StreamEvent::ThinkingStart,
                StreamEvent::thinking("first"),
                StreamEvent::thinking(PART_BREAK),
                StreamEvent::thinking("second"),
                StreamEvent::ThinkingEnd,
            ]
        );
    }

    #[test]
    fn test_missing_usage_still_reported() {
        let events = convert_response(&ResponsesResponse::default());
        assert_eq!(events, vec![StreamEvent::TokenUsage(TokenUsage::default())]);
    }
}
