//! Converts a complete Converse response into normalized events.

use crate::normalized::{StreamEvent, TokenUsage};
use crate::providers::empty_object;

use super::mapper::usage_from;
use super::types::{BedrockBlock, ConverseResponse};

pub fn convert_response(response: &ConverseResponse) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    for block in response.content() {
        match block {
            BedrockBlock::Text(text) => {
                events.push(StreamEvent::ContentStart);
                if !text.is_empty() {
                    events.push(StreamEvent::content(text.as_str()));
                }
                events.push(StreamEvent::ContentEnd);
            }
            BedrockBlock::ReasoningContent(reasoning) => {
                if let Some(reasoning_text) = &reasoning.reasoning_text {
                    events.push(StreamEvent::ThinkingStart);
                    if !reasoning_text.text.is_empty() {
                        events.push(StreamEvent::thinking(reasoning_text.text.as_str()));
                    }
                    events.push(StreamEvent::ThinkingEnd);
                }
            }
            BedrockBlock::ToolUse(tool) => events.push(StreamEvent::ToolUse {
                id: tool.tool_use_id.clone(),
                name: tool.name.clone(),
                input: if tool.input.is_null() {
                    empty_object()
                } else {
                    tool.input.clone()
                },
            }),
            BedrockBlock::ToolResult(_) | BedrockBlock::Other(_) => {}
        }
    }

    let usage = response
        .usage
        .as_ref()
        .map(usage_from)
        .unwrap_or_else(TokenUsage::default);
    events.push(StreamEvent::TokenUsage(usage));

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_converse_response() {
        let response: ConverseResponse = serde_json::from_value(json!({
            "output": {"message": {"role": "assistant", "content": [
                {"reasoningContent": {"reasoningText": {"text": "why", "signature": "s"}}},
                {"text": "because"},
                {"toolUse": {"toolUseId": "t1", "name": "calc", "input": {"a": 1}}},
                {"image": {"format": "png"}}
            ]}},
            "stopReason": "tool_use",
            "usage": {"inputTokens": 3, "outputTokens": 4, "totalTokens": 7}
        }))
        .unwrap();

        assert_eq!(
            convert_response(&response),
            vec![
                StreamEvent::ThinkingStart,
                StreamEvent::thinking("why"),
                StreamEvent::ThinkingEnd,
                StreamEvent::ContentStart,
                StreamEvent::content("because"),
                StreamEvent::ContentEnd,
                StreamEvent::ToolUse {
                    id: "t1".to_string(),
                    name: "calc".to_string(),
                    input: json!({"a": 1}),
                },
                StreamEvent::TokenUsage(TokenUsage {
                    input_tokens: Some(3),
                    output_tokens: Some(4),
                    ..TokenUsage::default()
                }),
            ]
        );
    }
}
