//! AWS Bedrock Converse wire types.
//!
//! Converse stream chunks name their event with a single outer key
//! (`{"contentBlockDelta": {...}}`) or, when relayed as server-sent events,
//! with the SSE event name. Either way the body is camelCase JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// One decoded Converse stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum BedrockEvent {
    MessageStart(MessageStart),
    ContentBlockStart(ContentBlockStart),
    ContentBlockDelta(ContentBlockDelta),
    ContentBlockStop(ContentBlockStop),
    MessageStop(MessageStop),
    Metadata(Metadata),
    /// A modelled stream exception (`throttlingException`, ...).
    Exception { kind: String, message: String },
}

impl BedrockEvent {
    /// Decode a body under its event name. Unknown names yield `Ok(None)`.
    pub fn from_named(name: &str, body: Value) -> Result<Option<Self>> {
        let event = match name {
            "messageStart" => Self::MessageStart(serde_json::from_value(body)?),
            "contentBlockStart" => Self::ContentBlockStart(serde_json::from_value(body)?),
            "contentBlockDelta" => Self::ContentBlockDelta(serde_json::from_value(body)?),
            "contentBlockStop" => Self::ContentBlockStop(serde_json::from_value(body)?),
            "messageStop" => Self::MessageStop(serde_json::from_value(body)?),
            "metadata" => Self::Metadata(serde_json::from_value(body)?),
            kind if kind.ends_with("Exception") => Self::Exception {
                kind: kind.to_string(),
                message: body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            other => {
                tracing::debug!(event = %other, "Ignoring unknown Bedrock event");
                return Ok(None);
            }
        };
        Ok(Some(event))
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MessageStart {
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlockStart {
    #[serde(default)]
    pub content_block_index: usize,
    #[serde(default)]
    pub start: Option<BlockStart>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockStart {
    #[serde(default)]
    pub tool_use: Option<ToolUseStart>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseStart {
    pub tool_use_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlockDelta {
    #[serde(default)]
    pub content_block_index: usize,
    #[serde(default)]
    pub delta: BlockDelta,
}

/// Exactly one member is set on a well-formed delta.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockDelta {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<ReasoningDelta>,
    #[serde(default)]
    pub tool_use: Option<ToolUseDelta>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningDelta {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub redacted_content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ToolUseDelta {
    #[serde(default)]
    pub input: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlockStop {
    #[serde(default)]
    pub content_block_index: usize,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageStop {
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Metadata {
    #[serde(default)]
    pub usage: Option<BedrockUsage>,
}

/// Converse usage. `inputTokens` excludes cache reads and writes.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BedrockUsage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_write_input_tokens: Option<u64>,
}

/// A Converse content block, as returned or persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum BedrockBlock {
    Text(String),
    ReasoningContent(ReasoningContent),
    ToolUse(ToolUseBlock),
    ToolResult(ToolResultBlock),
    /// Block kinds this crate does not interpret (images, documents, ...).
    #[serde(untagged)]
    Other(Value),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_text: Option<ReasoningText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacted_content: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReasoningText {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseBlock {
    pub tool_use_id: String,
    pub name: String,
    #[serde(default)]
    pub input: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// A complete Converse response body.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConverseResponse {
    #[serde(default)]
    pub output: ConverseOutput,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<BedrockUsage>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ConverseOutput {
    #[serde(default)]
    pub message: Option<ConverseMessage>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ConverseMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Vec<BedrockBlock>,
}

impl ConverseResponse {
    /// The assistant content blocks, if any.
    #[must_use]
    pub fn content(&self) -> &[BedrockBlock] {
        self.output
            .message
            .as_ref()
            .map_or(&[][..], |m| m.content.as_slice())
    }
}
