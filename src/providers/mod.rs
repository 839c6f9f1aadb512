//! Provider wire protocols.
//!
//! Every provider family speaks its own incremental event format. Each family
//! module turns that format into [`StreamEvent`]s through four pieces that
//! share nothing but their output contract:
//!
//! - a mapper: `(raw event, state) -> (events, state')`, pure
//! - a converter: `complete response -> events`, pure
//! - a full-content accumulator that rebuilds the provider-native turn
//! - a block filter used by [`crate::tidy`]
//!
//! # Families
//!
//! - [`anthropic`]: Anthropic Messages API
//! - [`openai`]: `OpenAI` Responses API
//! - [`bedrock`]: AWS Bedrock Converse stream
//! - [`chat`]: OpenAI-compatible Chat Completions (hosted or on-device engines)

pub mod anthropic;
pub mod bedrock;
pub mod chat;
pub mod openai;

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorInfo, Result, StreamError};
use crate::message::FullContent;
use crate::normalized::StreamEvent;

pub use anthropic::Anthropic;
pub use bedrock::Bedrock;
pub use chat::ChatCompletions;
pub use openai::OpenAiResponses;

/// Provider tag stored on every persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// Anthropic Messages API.
    Anthropic,
    /// `OpenAI` Responses API.
    #[serde(rename = "openai")]
    OpenAi,
    /// AWS Bedrock Converse.
    Bedrock,
    /// OpenAI-compatible Chat Completions.
    Chat,
}

impl ModelFamily {
    /// All supported families.
    pub const ALL: [Self; 4] = [Self::Anthropic, Self::OpenAi, Self::Bedrock, Self::Chat];

    /// Stable lowercase tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Bedrock => "bedrock",
            Self::Chat => "chat",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" | "responses" => Ok(Self::OpenAi),
            "bedrock" | "converse" => Ok(Self::Bedrock),
            "chat" | "chat_completions" | "openai-compatible" => Ok(Self::Chat),
            other => Err(StreamError::UnsupportedFamily(other.to_string())),
        }
    }
}

/// Result of one mapping step: the events produced and the successor state.
#[derive(Debug, Clone, PartialEq)]
pub struct Mapped<S> {
    pub events: Vec<StreamEvent>,
    pub state: S,
}

impl<S> Mapped<S> {
    #[must_use]
    pub fn new(events: Vec<StreamEvent>, state: S) -> Self {
        Self { events, state }
    }

    /// A step that emits nothing.
    #[must_use]
    pub fn unchanged(state: S) -> Self {
        Self {
            events: Vec::new(),
            state,
        }
    }
}

/// Which display block a mapper currently has open.
///
/// At most one of text or reasoning is open per mapper instance; opening one
/// always closes the other first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OpenBlock {
    #[default]
    None,
    Text,
    Reasoning,
}

impl OpenBlock {
    /// Close whatever is open, emitting the matching `.end`.
    #[must_use]
    pub fn close(self, events: &mut Vec<StreamEvent>) -> Self {
        match self {
            Self::None => {}
            Self::Text => events.push(StreamEvent::ContentEnd),
            Self::Reasoning => events.push(StreamEvent::ThinkingEnd),
        }
        Self::None
    }

    /// Make `kind` the open block, closing any other block first.
    #[must_use]
    pub fn open(self, kind: Self, events: &mut Vec<StreamEvent>) -> Self {
        if self == kind {
            return self;
        }
        let _ = self.close(events);
        match kind {
            Self::None => {}
            Self::Text => events.push(StreamEvent::ContentStart),
            Self::Reasoning => events.push(StreamEvent::ThinkingStart),
        }
        kind
    }
}

/// Outcome of a provider block filter during history tidying.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome<T> {
    /// The surviving content; `None` when nothing survived.
    pub filtered: Option<T>,
    /// Ids of tool invocations removed by this call.
    pub new_removed_ids: Vec<String>,
}

impl<T> FilterOutcome<T> {
    /// Map the surviving content, keeping the reported ids.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FilterOutcome<U> {
        FilterOutcome {
            filtered: self.filtered.map(f),
            new_removed_ids: self.new_removed_ids,
        }
    }
}

/// The per-family seam used by [`crate::pipeline`].
///
/// Implementations are zero-sized markers delegating to the family's own
/// mapper, converter and accumulator functions.
pub trait WireProtocol {
    /// Provider tag for this family.
    const FAMILY: ModelFamily;

    /// One decoded provider event.
    type RawEvent: fmt::Debug + Send;
    /// Mapper state; one value per in-flight request.
    type State: Default + Clone + fmt::Debug + Send;
    /// A complete, non-streamed response body.
    type Response: DeserializeOwned + fmt::Debug + Send;
    /// Builder for the provider-native persisted turn.
    type Accumulator: Default + fmt::Debug + Send;

    /// Decode one server-sent event frame. `Ok(None)` means "nothing to map".
    fn parse_frame(event: &str, data: &str) -> Result<Option<Self::RawEvent>>;

    /// One pure mapping step.
    fn map_event(raw: &Self::RawEvent, state: Self::State) -> Mapped<Self::State>;

    /// End-of-stream hook: force-close anything left open.
    fn finish(state: Self::State) -> Mapped<Self::State>;

    /// Whether this event marks a successfully completed response.
    fn is_terminal(raw: &Self::RawEvent) -> bool;

    /// A provider-reported failure carried in-band, if any.
    fn error_info(raw: &Self::RawEvent) -> Option<ErrorInfo>;

    /// Non-streaming conversion.
    fn convert_response(response: &Self::Response) -> Vec<StreamEvent>;

    /// Feed one raw event to the full-content accumulator.
    fn observe(acc: &mut Self::Accumulator, raw: &Self::RawEvent);

    /// Build the accumulator from a complete response.
    fn accumulate_response(response: &Self::Response) -> Self::Accumulator;

    /// Finalize the accumulator into persisted content.
    fn full_content(acc: Self::Accumulator) -> FullContent;
}

/// Parse concatenated tool-argument fragments exactly once.
///
/// Empty arguments fall back to `fallback` (an input supplied up front) or
/// `{}`. Unparsable arguments are reported as `{}` so the call is still seen.
pub(crate) fn parse_tool_input(
    raw: &str,
    fallback: Option<&serde_json::Value>,
    tool: &str,
) -> serde_json::Value {
    if raw.trim().is_empty() {
        return match fallback {
            Some(v) if !v.is_null() => v.clone(),
            _ => empty_object(),
        };
    }
    match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(
                tool = %tool,
                error = %e,
                arguments_length = raw.len(),
                "Unparsable tool arguments, reporting empty input"
            );
            empty_object()
        }
    }
}

/// Read a string field out of (possibly partial) tool-argument JSON.
pub(crate) fn json_string_field(raw: &str, key: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()?
        .get(key)?
        .as_str()
        .map(ToString::to_string)
}

pub(crate) fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Treat the default EventSource event name as "no name".
pub(crate) fn frame_name(event: &str) -> Option<&str> {
    let name = event.trim();
    if name.is_empty() || name == "message" {
        None
    } else {
        Some(name)
    }
}
