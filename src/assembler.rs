//! Content assembler.
//!
//! Turns a [`StreamEvent`] sequence into an ordered list of display groups.
//! Groups alternate category: consecutive blocks of one category share a
//! group, and a category change always starts a new group.
//!
//! Text and reasoning blocks are created lazily, on their first non-empty
//! delta, so an empty `start`/`end` pair leaves no trace. A new text block is
//! only created when the previous group is not already text; otherwise the
//! trailing text block is resumed (consolidation). Reasoning consolidates the
//! same way against a trailing thinking block.
//!
//! Blocks are never removed or reordered, so a [`BlockRef`] stays valid for
//! the life of the assembler. Web search and fetch blocks are updated through
//! their handle from placeholder to resolved form.
//!
//! # Example
//!
//! ```rust
//! use unistream::assembler::{ContentAssembler, GroupCategory};
//! use unistream::normalized::StreamEvent;
//!
//! let mut assembler = ContentAssembler::new();
//! for event in [
//!     StreamEvent::ThinkingStart,
//!     StreamEvent::thinking("hi"),
//!     StreamEvent::ThinkingEnd,
//!     StreamEvent::ContentStart,
//!     StreamEvent::content("ok"),
//!     StreamEvent::ContentEnd,
//! ] {
//!     assembler.apply(&event);
//! }
//! let groups = assembler.groups();
//! assert_eq!(groups.len(), 2);
//! assert_eq!(groups[0].category, GroupCategory::Backstage);
//! assert_eq!(groups[1].category, GroupCategory::Text);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorInfo;
use crate::normalized::{Citation, StreamEvent, TokenUsage};

/// Display category of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupCategory {
    /// User-visible prose.
    Text,
    /// Reasoning, tool invocations, web search and web fetch.
    Backstage,
    /// A failure appended by [`ContentAssembler::finalize_with_error`].
    Error,
}

/// One result attached to a web search block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A display block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        citations: Vec<Citation>,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    WebSearch {
        id: String,
        query: String,
        results: Vec<SearchHit>,
    },
    WebFetch {
        id: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    Error {
        #[serde(flatten)]
        info: ErrorInfo,
    },
}

impl ContentBlock {
    /// Group category this block belongs in.
    #[must_use]
    pub fn category(&self) -> GroupCategory {
        match self {
            Self::Text { .. } => GroupCategory::Text,
            Self::Error { .. } => GroupCategory::Error,
            _ => GroupCategory::Backstage,
        }
    }
}

/// An ordered run of same-category blocks. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentGroup {
    pub category: GroupCategory,
    pub blocks: Vec<ContentBlock>,
}

/// Stable handle to a block: group index, then block index within the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub group: usize,
    pub block: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Open {
    #[default]
    None,
    /// Text block open; the block exists once its first delta arrived.
    Text(Option<BlockRef>),
    Reasoning(Option<BlockRef>),
}

/// Incremental builder of display groups. One per in-flight turn.
#[derive(Debug, Clone, Default)]
pub struct ContentAssembler {
    groups: Vec<ContentGroup>,
    open: Open,
    /// Web search and fetch blocks by tool id.
    web_blocks: HashMap<String, BlockRef>,
    /// Citations received before their text block materialized.
    pending_citations: Vec<Citation>,
    usage: Option<TokenUsage>,
}

impl ContentAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a complete event sequence.
    #[must_use]
    pub fn assemble<'a>(events: impl IntoIterator<Item = &'a StreamEvent>) -> Vec<ContentGroup> {
        let mut assembler = Self::new();
        for event in events {
            assembler.apply(event);
        }
        assembler.into_groups()
    }

    /// The groups assembled so far.
    #[must_use]
    pub fn groups(&self) -> &[ContentGroup] {
        &self.groups
    }

    #[must_use]
    pub fn into_groups(self) -> Vec<ContentGroup> {
        self.groups
    }

    /// Look up a block by handle.
    #[must_use]
    pub fn block(&self, at: BlockRef) -> Option<&ContentBlock> {
        self.groups.get(at.group)?.blocks.get(at.block)
    }

    /// The last reported token usage, if any.
    #[must_use]
    pub fn usage(&self) -> Option<TokenUsage> {
        self.usage
    }

    /// Apply one event. Returns the block it created or changed, if any.
    pub fn apply(&mut self, event: &StreamEvent) -> Option<BlockRef> {
        match event {
            StreamEvent::ContentStart => {
                self.open = Open::Text(None);
                None
            }
            StreamEvent::Content { text } => self.append_text(text),
            StreamEvent::ContentEnd => {
                self.end_text();
                None
            }
            StreamEvent::ThinkingStart => {
                self.open = Open::Reasoning(None);
                None
            }
            StreamEvent::Thinking { text } => self.append_thinking(text),
            StreamEvent::ThinkingEnd => {
                if matches!(self.open, Open::Reasoning(_)) {
                    self.open = Open::None;
                }
                None
            }
            StreamEvent::WebSearchStart { id } => Some(self.web_search(id)),
            StreamEvent::WebSearch { id, query } => {
                let at = self.web_search(id);
                if let Some(ContentBlock::WebSearch { query: existing, .. }) = self.block_mut(at) {
                    existing.clone_from(query);
                }
                Some(at)
            }
            StreamEvent::WebSearchResult {
                tool_use_id,
                title,
                url,
            } => {
                let Some(at) = self.web_blocks.get(tool_use_id).copied() else {
                    tracing::debug!(tool_use_id = %tool_use_id, "Dropping web search result for unknown id");
                    return None;
                };
                match self.block_mut(at) {
                    Some(ContentBlock::WebSearch { results, .. }) => {
                        results.push(SearchHit {
                            title: title.clone(),
                            url: url.clone(),
                        });
                        Some(at)
                    }
                    _ => None,
                }
            }
            StreamEvent::WebFetchStart { id } => Some(self.web_fetch(id)),
            StreamEvent::WebFetch { id, url } => {
                let at = self.web_fetch(id);
                if let Some(ContentBlock::WebFetch { url: existing, .. }) = self.block_mut(at) {
                    existing.clone_from(url);
                }
                Some(at)
            }
            StreamEvent::WebFetchResult {
                tool_use_id,
                url,
                title,
            } => {
                let Some(at) = self.web_blocks.get(tool_use_id).copied() else {
                    tracing::debug!(tool_use_id = %tool_use_id, "Dropping web fetch result for unknown id");
                    return None;
                };
                match self.block_mut(at) {
                    Some(ContentBlock::WebFetch {
                        url: existing_url,
                        title: existing_title,
                        ..
                    }) => {
                        if !url.is_empty() {
                            existing_url.clone_from(url);
                        }
                        if title.is_some() {
                            existing_title.clone_from(title);
                        }
                        Some(at)
                    }
                    _ => None,
                }
            }
            StreamEvent::Citation(citation) => self.cite(citation),
            StreamEvent::ToolUse { id, name, input } => Some(self.push_block(ContentBlock::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            })),
            StreamEvent::TokenUsage(usage) => {
                self.usage = Some(*usage);
                None
            }
            StreamEvent::Event { .. } => None,
        }
    }

    /// A copy of the groups with an error group appended. Live state is untouched.
    #[must_use]
    pub fn finalize_with_error(&self, error: ErrorInfo) -> Vec<ContentGroup> {
        let mut groups = self.groups.clone();
        groups.push(ContentGroup {
            category: GroupCategory::Error,
            blocks: vec![ContentBlock::Error { info: error }],
        });
        groups
    }

    fn block_mut(&mut self, at: BlockRef) -> Option<&mut ContentBlock> {
        self.groups.get_mut(at.group)?.blocks.get_mut(at.block)
    }

    /// The trailing block of the last group, when that group has `category`.
    fn trailing(&self, category: GroupCategory) -> Option<BlockRef> {
        let group = self.groups.len().checked_sub(1)?;
        let last = &self.groups[group];
        if last.category != category {
            return None;
        }
        Some(BlockRef {
            group,
            block: last.blocks.len().checked_sub(1)?,
        })
    }

    /// Append a block, joining the last group when the category matches.
    fn push_block(&mut self, block: ContentBlock) -> BlockRef {
        let category = block.category();
        if category != GroupCategory::Text {
            self.close_text();
        }
        if !matches!(block, ContentBlock::Thinking { .. }) && matches!(self.open, Open::Reasoning(_)) {
            self.open = Open::None;
        }
        let last = self.groups.len().wrapping_sub(1);
        match self.groups.last_mut() {
            Some(group) if group.category == category => {
                group.blocks.push(block);
                BlockRef {
                    group: last,
                    block: group.blocks.len() - 1,
                }
            }
            _ => {
                self.groups.push(ContentGroup {
                    category,
                    blocks: vec![block],
                });
                BlockRef {
                    group: self.groups.len() - 1,
                    block: 0,
                }
            }
        }
    }

    fn append_text(&mut self, text: &str) -> Option<BlockRef> {
        if text.is_empty() {
            return None;
        }
        let at = match self.open {
            Open::Text(Some(at)) => at,
            _ => {
                let at = match self.trailing(GroupCategory::Text) {
                    Some(at) => at,
                    None => self.push_block(ContentBlock::Text {
                        text: String::new(),
                        citations: Vec::new(),
                    }),
                };
                self.open = Open::Text(Some(at));
                let pending = std::mem::take(&mut self.pending_citations);
                if let Some(ContentBlock::Text { citations, .. }) = self.block_mut(at) {
                    citations.extend(pending);
                }
                at
            }
        };
        if let Some(ContentBlock::Text { text: existing, .. }) = self.block_mut(at) {
            existing.push_str(text);
        }
        Some(at)
    }

    fn append_thinking(&mut self, text: &str) -> Option<BlockRef> {
        if text.is_empty() {
            return None;
        }
        let at = match self.open {
            Open::Reasoning(Some(at)) => at,
            _ => {
                let resumable = self.trailing(GroupCategory::Backstage).filter(|at| {
                    matches!(self.block(*at), Some(ContentBlock::Thinking { .. }))
                });
                let at = match resumable {
                    Some(at) => {
                        self.close_text();
                        at
                    }
                    None => self.push_block(ContentBlock::Thinking {
                        thinking: String::new(),
                    }),
                };
                self.open = Open::Reasoning(Some(at));
                at
            }
        };
        if let Some(ContentBlock::Thinking { thinking }) = self.block_mut(at) {
            thinking.push_str(text);
        }
        Some(at)
    }

    fn cite(&mut self, citation: &Citation) -> Option<BlockRef> {
        if let Open::Text(Some(at)) = self.open {
            if let Some(ContentBlock::Text { citations, .. }) = self.block_mut(at) {
                citations.push(citation.clone());
                return Some(at);
            }
        }
        self.pending_citations.push(citation.clone());
        None
    }

    fn end_text(&mut self) {
        if !self.pending_citations.is_empty() {
            let target = self.trailing(GroupCategory::Text);
            let pending = std::mem::take(&mut self.pending_citations);
            match target.and_then(|at| self.block_mut(at)) {
                Some(ContentBlock::Text { citations, .. }) => citations.extend(pending),
                _ => tracing::debug!(count = pending.len(), "Dropping citations without a text block"),
            }
        }
        if matches!(self.open, Open::Text(_)) {
            self.open = Open::None;
        }
    }

    fn close_text(&mut self) {
        if matches!(self.open, Open::Text(_)) {
            self.end_text();
        }
    }

    fn web_search(&mut self, id: &str) -> BlockRef {
        if let Some(at) = self.web_blocks.get(id) {
            return *at;
        }
        let at = self.push_block(ContentBlock::WebSearch {
            id: id.to_string(),
            query: String::new(),
            results: Vec::new(),
        });
        self.web_blocks.insert(id.to_string(), at);
        at
    }

    fn web_fetch(&mut self, id: &str) -> BlockRef {
        if let Some(at) = self.web_blocks.get(id) {
            return *at;
        }
        let at = self.push_block(ContentBlock::WebFetch {
            id: id.to_string(),
            url: String::new(),
            title: None,
        });
        self.web_blocks.insert(id.to_string(), at);
        at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(t: &str) -> ContentBlock {
        ContentBlock::Text {
            text: t.to_string(),
            citations: Vec::new(),
        }
    }

    fn thinking(t: &str) -> ContentBlock {
        ContentBlock::Thinking {
            thinking: t.to_string(),
        }
    }

    fn tool(id: &str) -> StreamEvent {
        StreamEvent::ToolUse {
            id: id.to_string(),
            name: "lookup".to_string(),
            input: serde_json::json!({}),
        }
    }

    #[test]
    fn test_block_joining_a_group_gets_its_position() {
        let mut assembler = ContentAssembler::new();
        assembler.apply(&StreamEvent::content("intro"));
        let first = assembler.apply(&tool("t1")).unwrap();
        let second = assembler.apply(&tool("t2")).unwrap();

        assert_eq!(first, BlockRef { group: 1, block: 0 });
        assert_eq!(second, BlockRef { group: 1, block: 1 });
        assert!(matches!(
            assembler.block(second),
            Some(ContentBlock::ToolUse { id, .. }) if id == "t2"
        ));
    }

    #[test]
    fn test_thinking_then_text_scenario() {
        let groups = ContentAssembler::assemble(&[
            StreamEvent::ThinkingStart,
            StreamEvent::thinking("hi"),
            StreamEvent::ThinkingEnd,
            StreamEvent::ContentStart,
            StreamEvent::content("ok"),
            StreamEvent::ContentEnd,
        ]);
        assert_eq!(
            groups,
            vec![
                ContentGroup {
                    category: GroupCategory::Backstage,
                    blocks: vec![thinking("hi")],
                },
                ContentGroup {
                    category: GroupCategory::Text,
                    blocks: vec![text("ok")],
                },
            ]
        );
    }

    #[test]
    fn test_consecutive_text_blocks_consolidate() {
        let groups = ContentAssembler::assemble(&[
            StreamEvent::ContentStart,
            StreamEvent::content("Hello, "),
            StreamEvent::ContentEnd,
            StreamEvent::marker("ping"),
            StreamEvent::ContentStart,
            StreamEvent::content("world"),
            StreamEvent::ContentEnd,
        ]);
        assert_eq!(
            groups,
            vec![ContentGroup {
                category: GroupCategory::Text,
                blocks: vec![text("Hello, world")],
            }]
        );
    }

    #[test]
    fn test_interleaving_preserves_order() {
        let groups = ContentAssembler::assemble(&[
            StreamEvent::ContentStart,
            StreamEvent::content("a"),
            StreamEvent::ContentEnd,
            StreamEvent::ThinkingStart,
            StreamEvent::thinking("b"),
            StreamEvent::ThinkingEnd,
            StreamEvent::ContentStart,
            StreamEvent::content("c"),
            StreamEvent::ContentEnd,
        ]);
        let categories: Vec<_> = groups.iter().map(|g| g.category).collect();
        assert_eq!(
            categories,
            vec![GroupCategory::Text, GroupCategory::Backstage, GroupCategory::Text]
        );
        assert_eq!(groups[2].blocks, vec![text("c")]);
    }

    #[test]
    fn test_empty_deltas_are_idempotent() {
        let mut assembler = ContentAssembler::new();
        assembler.apply(&StreamEvent::ContentStart);
        assembler.apply(&StreamEvent::content("x"));
        let before = assembler.groups().to_vec();
        assert!(assembler.apply(&StreamEvent::content("")).is_none());
        assert!(assembler.apply(&StreamEvent::thinking("")).is_none());
        assert_eq!(assembler.groups(), before.as_slice());
    }

    #[test]
    fn test_empty_block_leaves_no_group() {
        let groups = ContentAssembler::assemble(&[
            StreamEvent::ThinkingStart,
            StreamEvent::ThinkingEnd,
            StreamEvent::ContentStart,
            StreamEvent::ContentEnd,
        ]);
        assert!(groups.is_empty());
    }

    #[test]
    fn test_web_search_block_keeps_identity() {
        let mut assembler = ContentAssembler::new();
        let start = assembler.apply(&StreamEvent::WebSearchStart {
            id: "ws1".to_string(),
        });
        let resolved = assembler.apply(&StreamEvent::WebSearch {
            id: "ws1".to_string(),
            query: "weather".to_string(),
        });
        let result = assembler.apply(&StreamEvent::WebSearchResult {
            tool_use_id: "ws1".to_string(),
            title: Some("T".to_string()),
            url: Some("U".to_string()),
        });
        assert!(start.is_some());
        assert_eq!(start, resolved);
        assert_eq!(start, result);
        assert_eq!(
            assembler.groups(),
            &[ContentGroup {
                category: GroupCategory::Backstage,
                blocks: vec![ContentBlock::WebSearch {
                    id: "ws1".to_string(),
                    query: "weather".to_string(),
                    results: vec![SearchHit {
                        title: Some("T".to_string()),
                        url: Some("U".to_string()),
                    }],
                }],
            }]
        );
    }

    #[test]
    fn test_result_for_unknown_search_is_dropped() {
        let mut assembler = ContentAssembler::new();
        let touched = assembler.apply(&StreamEvent::WebSearchResult {
            tool_use_id: "nope".to_string(),
            title: None,
            url: None,
        });
        assert!(touched.is_none());
        assert!(assembler.groups().is_empty());
    }

    #[test]
    fn test_web_fetch_result_updates_block() {
        let groups = ContentAssembler::assemble(&[
            StreamEvent::WebFetchStart { id: "f".to_string() },
            StreamEvent::WebFetch {
                id: "f".to_string(),
                url: "https://a.example".to_string(),
            },
            StreamEvent::WebFetchResult {
                tool_use_id: "f".to_string(),
                url: "https://a.example/final".to_string(),
                title: Some("A".to_string()),
            },
        ]);
        assert_eq!(
            groups[0].blocks,
            vec![ContentBlock::WebFetch {
                id: "f".to_string(),
                url: "https://a.example/final".to_string(),
                title: Some("A".to_string()),
            }]
        );
    }

    #[test]
    fn test_tool_use_joins_backstage_group() {
        let groups = ContentAssembler::assemble(&[
            StreamEvent::ThinkingStart,
            StreamEvent::thinking("plan"),
            StreamEvent::ThinkingEnd,
            StreamEvent::ToolUse {
                id: "t1".to_string(),
                name: "calc".to_string(),
                input: serde_json::json!({}),
            },
            StreamEvent::ThinkingStart,
            StreamEvent::thinking("more"),
            StreamEvent::ThinkingEnd,
        ]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].blocks.len(), 3);
        assert_eq!(groups[0].blocks[2], thinking("more"));
    }

    #[test]
    fn test_citations_attach_to_text_block() {
        let citation = Citation {
            url: "https://c.example".to_string(),
            title: None,
            cited_text: None,
        };
        let groups = ContentAssembler::assemble(&[
            StreamEvent::ContentStart,
            StreamEvent::Citation(citation.clone()),
            StreamEvent::content("fact"),
            StreamEvent::ContentEnd,
        ]);
        assert_eq!(
            groups[0].blocks,
            vec![ContentBlock::Text {
                text: "fact".to_string(),
                citations: vec![citation],
            }]
        );
    }

    #[test]
    fn test_finalize_with_error_does_not_mutate() {
        let mut assembler = ContentAssembler::new();
        assembler.apply(&StreamEvent::ContentStart);
        assembler.apply(&StreamEvent::content("partial"));

        let failed = assembler.finalize_with_error(ErrorInfo::new("boom").with_status(500));
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[1].category, GroupCategory::Error);
        assert_eq!(assembler.groups().len(), 1);

        assembler.apply(&StreamEvent::content(" more"));
        assert_eq!(assembler.groups()[0].blocks, vec![text("partial more")]);
        assert_eq!(failed[0].blocks, vec![text("partial")]);
    }

    #[test]
    fn test_groups_serialize_for_rendering() {
        let groups = ContentAssembler::assemble(&[StreamEvent::ContentStart, StreamEvent::content("x")]);
        assert_eq!(
            serde_json::to_value(&groups).unwrap(),
            serde_json::json!([{"category": "text", "blocks": [{"type": "text", "text": "x"}]}])
        );
    }
}
