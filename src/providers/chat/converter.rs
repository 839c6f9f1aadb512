//! Converts a complete `chat.completion` body into normalized events.

use crate::normalized::StreamEvent;
use crate::providers::parse_tool_input;

use super::mapper::usage_from;
use super::types::ChatCompletion;

pub fn convert_response(response: &ChatCompletion) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    if let Some(choice) = response.choices.first() {
        let message = &choice.message;
        let reasoning = message
            .reasoning_content
            .as_deref()
            .or(message.reasoning.as_deref());
        if let Some(reasoning) = reasoning.filter(|r| !r.is_empty()) {
            events.push(StreamEvent::ThinkingStart);
            events.push(StreamEvent::thinking(reasoning));
            events.push(StreamEvent::ThinkingEnd);
        }
        if let Some(text) = message.content.as_deref().filter(|t| !t.is_empty()) {
            events.push(StreamEvent::ContentStart);
            events.push(StreamEvent::content(text));
            events.push(StreamEvent::ContentEnd);
        }
        events.extend(message.tool_calls.iter().map(|call| StreamEvent::ToolUse {
            id: call.id.clone(),
            name: call.function.name.clone(),
            input: parse_tool_input(&call.function.arguments, None, &call.function.name),
        }));
    }

    events.push(StreamEvent::TokenUsage(
        response.usage.as_ref().map(usage_from).unwrap_or_default(),
    ));
    events
}
