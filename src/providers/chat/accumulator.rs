//! Rebuilds the persisted parts of a Chat Completions turn.
//!
//! The wire carries no block index for text or reasoning, so the turn is
//! stored as reasoning, then text, then tool calls in tool index order.

use std::collections::BTreeMap;

use super::fallback_call_id;
use super::types::{ChatCompletion, ChatEvent, ChatPart};

#[derive(Debug, Default, Clone)]
pub struct ChatAccumulator {
    reasoning: String,
    text: String,
    tool_calls: BTreeMap<usize, ToolCallParts>,
}

#[derive(Debug, Default, Clone)]
struct ToolCallParts {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl ChatAccumulator {
    #[must_use]
    pub fn from_response(response: &ChatCompletion) -> Self {
        let mut acc = Self::default();
        if let Some(choice) = response.choices.first() {
            let message = &choice.message;
            if let Some(reasoning) = message
                .reasoning_content
                .as_deref()
                .or(message.reasoning.as_deref())
            {
                acc.reasoning.push_str(reasoning);
            }
            if let Some(text) = &message.content {
                acc.text.push_str(text);
            }
            for (index, call) in message.tool_calls.iter().enumerate() {
                acc.tool_calls.insert(
                    index,
                    ToolCallParts {
                        id: Some(call.id.clone()),
                        name: Some(call.function.name.clone()),
                        arguments: call.function.arguments.clone(),
                    },
                );
            }
        }
        acc
    }

    pub fn observe(&mut self, event: &ChatEvent) {
        let ChatEvent::Chunk(chunk) = event else {
            return;
        };
        let Some(choice) = chunk.choices.first() else {
            return;
        };
        let delta = &choice.delta;
        if let Some(reasoning) = delta.reasoning_text() {
            self.reasoning.push_str(reasoning);
        }
        if let Some(text) = &delta.content {
            self.text.push_str(text);
        }
        for call in delta.tool_calls.iter().flatten() {
            let entry = self.tool_calls.entry(call.index).or_default();
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
    }

    #[must_use]
    pub fn finalize(self) -> Vec<ChatPart> {
        let mut parts = Vec::new();
        if !self.reasoning.is_empty() {
            parts.push(ChatPart::Reasoning {
                text: self.reasoning,
            });
        }
        if !self.text.is_empty() {
            parts.push(ChatPart::Text { text: self.text });
        }
        parts.extend(self.tool_calls.into_iter().filter_map(|(index, call)| {
            Some(ChatPart::ToolCall {
                name: call.name?,
                id: call.id.unwrap_or_else(|| fallback_call_id(index)),
                arguments: call.arguments,
            })
        }));
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_reasoning_text_tools() {
        let mut acc = ChatAccumulator::default();
        for line in [
            r#"{"choices":[{"delta":{"content":"an"}}]}"#,
            r#"{"choices":[{"delta":{"reasoning":"think"}}]}"#,
            r#"{"choices":[{"delta":{"content":"swer","tool_calls":[{"index":0,"id":"c","function":{"name":"f","arguments":"{}"}}]}}]}"#,
        ] {
            acc.observe(&ChatEvent::Chunk(serde_json::from_str(line).unwrap()));
        }
        acc.observe(&ChatEvent::Done);
        assert_eq!(
            acc.finalize(),
            vec![
                ChatPart::Reasoning {
                    text: "think".to_string()
                },
                ChatPart::Text {
                    text: "answer".to_string()
                },
                ChatPart::ToolCall {
                    id: "c".to_string(),
                    name: "f".to_string(),
                    arguments: "{}".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_tool_call_without_id_gets_index_id() {
        let mut acc = ChatAccumulator::default();
        acc.observe(&ChatEvent::Chunk(
            serde_json::from_str(
                r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"function":{"name":"lookup","arguments":"{}"}}]}}]}"#,
            )
            .unwrap(),
        ));
        assert_eq!(
            acc.finalize(),
            vec![ChatPart::ToolCall {
                id: "call_1".to_string(),
                name: "lookup".to_string(),
                arguments: "{}".to_string(),
            }]
        );
    }
}
