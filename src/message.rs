//! Persisted conversation turns.
//!
//! A [`Message`] carries plain display text for every consumer plus, for
//! assistant turns (and tool results), the provider-native [`FullContent`]
//! needed to resubmit the turn to the same provider family later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::providers::ModelFamily;
use crate::providers::anthropic::types::AnthropicBlock;
use crate::providers::bedrock::types::BedrockBlock;
use crate::providers::chat::types::ChatPart;
use crate::providers::openai::types::{MessagePart, OutputItem};

/// Message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Provider-native content of one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", content = "blocks", rename_all = "lowercase")]
pub enum FullContent {
    Anthropic(Vec<AnthropicBlock>),
    #[serde(rename = "openai")]
    OpenAi(Vec<OutputItem>),
    Bedrock(Vec<BedrockBlock>),
    Chat(Vec<ChatPart>),
}

impl FullContent {
    /// Family this content can be resubmitted to.
    #[must_use]
    pub fn family(&self) -> ModelFamily {
        match self {
            Self::Anthropic(_) => ModelFamily::Anthropic,
            Self::OpenAi(_) => ModelFamily::OpenAi,
            Self::Bedrock(_) => ModelFamily::Bedrock,
            Self::Chat(_) => ModelFamily::Chat,
        }
    }

    /// Number of native blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Anthropic(blocks) => blocks.len(),
            Self::OpenAi(items) => items.len(),
            Self::Bedrock(blocks) => blocks.len(),
            Self::Chat(parts) => parts.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenated text blocks, for the plain display text of a message.
    #[must_use]
    pub fn display_text(&self) -> String {
        let mut out = String::new();
        match self {
            Self::Anthropic(blocks) => {
                for block in blocks {
                    if let AnthropicBlock::Text { text, .. } = block {
                        out.push_str(text);
                    }
                }
            }
            Self::OpenAi(items) => {
                for item in items {
                    if let OutputItem::Message { content, .. } = item {
                        for part in content {
                            match part {
                                MessagePart::OutputText { text, .. } => out.push_str(text),
                                MessagePart::Refusal { refusal } => out.push_str(refusal),
                                MessagePart::Unknown => {}
                            }
                        }
                    }
                }
            }
            Self::Bedrock(blocks) => {
                for block in blocks {
                    if let BedrockBlock::Text(text) = block {
                        out.push_str(text);
                    }
                }
            }
            Self::Chat(parts) => {
                for part in parts {
                    if let ChatPart::Text { text } = part {
                        out.push_str(text);
                    }
                }
            }
        }
        out
    }
}

/// One persisted conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    /// Family that produced (or will consume) `full_content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_family: Option<ModelFamily>,
    /// Plain display text.
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_content: Option<FullContent>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// A user turn with plain text and no native content.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            model_family: None,
            text: text.into(),
            full_content: None,
            created_at: Utc::now(),
        }
    }

    /// A turn carrying native content; the family is taken from the content.
    #[must_use]
    pub fn with_content(role: Role, content: FullContent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            model_family: Some(content.family()),
            text: content.display_text(),
            full_content: Some(content),
            created_at: Utc::now(),
        }
    }

    /// An assistant turn built from accumulated native content.
    #[must_use]
    pub fn assistant(content: FullContent) -> Self {
        Self::with_content(Role::Assistant, content)
    }

    /// Replace the id, for fixtures and callers that assign their own.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}
