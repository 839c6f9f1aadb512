//! Normalized event types for streaming LLM responses.
//!
//! This module defines the single event vocabulary every provider family is
//! mapped onto, whether the response arrived as a stream of incremental
//! protocol events or as one complete body.
//!
//! # Event Types
//!
//! The [`StreamEvent`] enum covers:
//! - Text and reasoning block lifecycles (`start`, delta, `end`)
//! - Web search and web fetch lifecycles (placeholder, resolution, results)
//! - Atomic tool invocations and citations
//! - Token usage and passthrough diagnostic markers
//!
//! # Example
//!
//! ```rust
//! use unistream::normalized::{StreamEvent, sse_event};
//!
//! let event = StreamEvent::Content {
//!     text: "Hello".to_string(),
//! };
//! let sse = sse_event(&event);
//! assert!(sse.starts_with("event: content\n"));
//! ```

use serde::{Deserialize, Serialize};

/// Citation reference attached to the currently open text block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citation {
    /// URL of the cited source.
    pub url: String,
    /// Optional title of the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Optional excerpt the model quoted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cited_text: Option<String>,
}

/// Token accounting normalized across providers.
///
/// `input_tokens` is always the freshly consumed input: cached reads are
/// reported separately in `cache_read_tokens` and never counted twice.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_tokens: Option<u64>,
}

impl TokenUsage {
    /// Fresh input for providers whose headline input count includes cached reads.
    #[must_use]
    pub fn fresh_input(raw_input: Option<u64>, cache_read: Option<u64>) -> Option<u64> {
        raw_input.map(|raw| raw.saturating_sub(cache_read.unwrap_or(0)))
    }

    /// Whether no counter has been reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Normalized streaming events emitted by every provider mapper and converter.
///
/// This is a closed vocabulary: the assembler, the persistence layer and the
/// golden-file tests are all written against it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum StreamEvent {
    // ─────────────────────────────────────────────────────────────────────
    // Text
    // ─────────────────────────────────────────────────────────────────────
    /// A text block opened.
    #[serde(rename = "content.start")]
    ContentStart,

    /// Incremental text for the open text block.
    #[serde(rename = "content")]
    Content {
        /// The text fragment to append.
        text: String,
    },

    /// The open text block closed.
    #[serde(rename = "content.end")]
    ContentEnd,

    // ─────────────────────────────────────────────────────────────────────
    // Reasoning
    // ─────────────────────────────────────────────────────────────────────
    /// A reasoning block opened.
    #[serde(rename = "thinking.start")]
    ThinkingStart,

    /// Incremental reasoning for the open reasoning block.
    #[serde(rename = "thinking")]
    Thinking {
        /// The reasoning fragment to append.
        text: String,
    },

    /// The open reasoning block closed.
    #[serde(rename = "thinking.end")]
    ThinkingEnd,

    // ─────────────────────────────────────────────────────────────────────
    // Hosted tools
    // ─────────────────────────────────────────────────────────────────────
    /// A web search began; the query is not known yet.
    #[serde(rename = "web_search.start")]
    WebSearchStart { id: String },

    /// The query of a web search is known.
    #[serde(rename = "web_search")]
    WebSearch { id: String, query: String },

    /// One result of a web search.
    #[serde(rename = "web_search.result")]
    WebSearchResult {
        tool_use_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },

    /// A web fetch began; the URL is not known yet.
    #[serde(rename = "web_fetch.start")]
    WebFetchStart { id: String },

    /// The URL of a web fetch is known.
    #[serde(rename = "web_fetch")]
    WebFetch { id: String, url: String },

    /// The fetched page came back.
    #[serde(rename = "web_fetch.result")]
    WebFetchResult {
        tool_use_id: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Attachments and tools
    // ─────────────────────────────────────────────────────────────────────
    /// A citation for the currently open text block.
    #[serde(rename = "citation")]
    Citation(Citation),

    /// A fully formed tool invocation. Never split across events.
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Accounting and diagnostics
    // ─────────────────────────────────────────────────────────────────────
    /// Token usage for the turn.
    #[serde(rename = "token_usage")]
    TokenUsage(TokenUsage),

    /// Passthrough marker for diagnostics; carries no display semantics.
    #[serde(rename = "event")]
    Event { name: String },
}

impl StreamEvent {
    /// Shorthand for a text delta.
    #[must_use]
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content { text: text.into() }
    }

    /// Shorthand for a reasoning delta.
    #[must_use]
    pub fn thinking(text: impl Into<String>) -> Self {
        Self::Thinking { text: text.into() }
    }

    /// Shorthand for a diagnostic marker.
    #[must_use]
    pub fn marker(name: impl Into<String>) -> Self {
        Self::Event { name: name.into() }
    }
}

/// Get the wire name for a [`StreamEvent`].
pub fn event_name(evt: &StreamEvent) -> &'static str {
    match evt {
        StreamEvent::ContentStart => "content.start",
        StreamEvent::Content { .. } => "content",
        StreamEvent::ContentEnd => "content.end",
        StreamEvent::ThinkingStart => "thinking.start",
        StreamEvent::Thinking { .. } => "thinking",
        StreamEvent::ThinkingEnd => "thinking.end",
        StreamEvent::WebSearchStart { .. } => "web_search.start",
        StreamEvent::WebSearch { .. } => "web_search",
        StreamEvent::WebSearchResult { .. } => "web_search.result",
        StreamEvent::WebFetchStart { .. } => "web_fetch.start",
        StreamEvent::WebFetch { .. } => "web_fetch",
        StreamEvent::WebFetchResult { .. } => "web_fetch.result",
        StreamEvent::Citation(_) => "citation",
        StreamEvent::ToolUse { .. } => "tool_use",
        StreamEvent::TokenUsage(_) => "token_usage",
        StreamEvent::Event { .. } => "event",
    }
}

/// Convert a [`StreamEvent`] to an SSE-formatted string.
///
/// The output carries both an `event:` line (for EventSource listeners) and a
/// `data:` line containing the JSON payload.
///
/// # Example
///
/// ```rust
/// use unistream::normalized::{StreamEvent, sse_event};
///
/// let sse = sse_event(&StreamEvent::ContentEnd);
/// assert!(sse.contains("event: content.end"));
/// ```
pub fn sse_event(evt: &StreamEvent) -> String {
    let json = serde_json::to_string(evt).unwrap_or_else(|e| {
        serde_json::json!({ "type": "event", "name": format!("serialize_error: {e}") }).to_string()
    });

    let event_name = event_name(evt);

    format!("event: {event_name}\ndata: {json}\n\n")
}

/// Serialize a sequence of events as newline-delimited JSON, one event per line.
pub fn to_json_lines<'a>(events: impl IntoIterator<Item = &'a StreamEvent>) -> serde_json::Result<String> {
    let mut out = String::new();
    for evt in events {
        out.push_str(&serde_json::to_string(evt)?);
        out.push('\n');
    }
    Ok(out)
}
