//! History tidy ("swipe") filter.
//!
//! Before a conversation is resubmitted, turns at or before a checkpoint are
//! pruned: reasoning is always stripped, and invocations of selected tools
//! are removed together with their results. The walk is provider-agnostic;
//! the per-family block filter does the actual pruning.
//!
//! The input slice is never modified. Kept messages are copies with the
//! filtered content substituted; messages after the checkpoint are copied
//! unchanged.

use std::collections::HashSet;

use crate::message::{FullContent, Message};
use crate::providers::{FilterOutcome, ModelFamily, anthropic, bedrock, chat, openai};

/// Family-level block filter:
/// `(content, removed_tool_names, is_checkpoint, removed_tool_use_ids)`.
pub type BlockFilter =
    fn(&FullContent, &HashSet<String>, bool, &HashSet<String>) -> FilterOutcome<FullContent>;

/// The block filter for `family`, lifted to [`FullContent`].
///
/// Content of another family passes through untouched.
#[must_use]
pub fn filter_for(family: ModelFamily) -> BlockFilter {
    match family {
        ModelFamily::Anthropic => filter_anthropic,
        ModelFamily::OpenAi => filter_openai,
        ModelFamily::Bedrock => filter_bedrock,
        ModelFamily::Chat => filter_chat,
    }
}

fn passthrough(content: &FullContent) -> FilterOutcome<FullContent> {
    FilterOutcome {
        filtered: Some(content.clone()),
        new_removed_ids: Vec::new(),
    }
}

fn filter_anthropic(
    content: &FullContent,
    names: &HashSet<String>,
    is_checkpoint: bool,
    ids: &HashSet<String>,
) -> FilterOutcome<FullContent> {
    match content {
        FullContent::Anthropic(blocks) => {
            anthropic::filter::filter_blocks(blocks, names, is_checkpoint, ids)
                .map(FullContent::Anthropic)
        }
        other => passthrough(other),
    }
}

fn filter_openai(
    content: &FullContent,
    names: &HashSet<String>,
    is_checkpoint: bool,
    ids: &HashSet<String>,
) -> FilterOutcome<FullContent> {
    match content {
        FullContent::OpenAi(items) => {
            openai::filter::filter_blocks(items, names, is_checkpoint, ids).map(FullContent::OpenAi)
        }
        other => passthrough(other),
    }
}

fn filter_bedrock(
    content: &FullContent,
    names: &HashSet<String>,
    is_checkpoint: bool,
    ids: &HashSet<String>,
) -> FilterOutcome<FullContent> {
    match content {
        FullContent::Bedrock(blocks) => {
            bedrock::filter::filter_blocks(blocks, names, is_checkpoint, ids)
                .map(FullContent::Bedrock)
        }
        other => passthrough(other),
    }
}

fn filter_chat(
    content: &FullContent,
    names: &HashSet<String>,
    is_checkpoint: bool,
    ids: &HashSet<String>,
) -> FilterOutcome<FullContent> {
    match content {
        FullContent::Chat(parts) => {
            chat::filter::filter_blocks(parts, names, is_checkpoint, ids).map(FullContent::Chat)
        }
        other => passthrough(other),
    }
}

/// Prune `messages` up to and including the checkpoint.
///
/// Returns a copy of `messages` unchanged when `checkpoint_id` is `None` or
/// names no message. Messages of another family, or without native content,
/// pass through. A message whose filtered content is empty is dropped.
pub fn tidy_history<F>(
    messages: &[Message],
    checkpoint_id: Option<&str>,
    removed_tool_names: &HashSet<String>,
    family: ModelFamily,
    mut filter: F,
) -> Vec<Message>
where
    F: FnMut(&FullContent, &HashSet<String>, bool, &HashSet<String>) -> FilterOutcome<FullContent>,
{
    let Some(checkpoint_id) = checkpoint_id else {
        return messages.to_vec();
    };
    let Some(checkpoint) = messages.iter().rposition(|m| m.id == checkpoint_id) else {
        tracing::debug!(checkpoint_id = %checkpoint_id, "Checkpoint not found, history left as is");
        return messages.to_vec();
    };

    let mut removed_tool_use_ids: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(messages.len());
    let mut dropped = 0usize;

    for (index, message) in messages[..=checkpoint].iter().enumerate() {
        let content = match &message.full_content {
            Some(content) if message.model_family == Some(family) => content,
            _ => {
                out.push(message.clone());
                continue;
            }
        };

        let outcome = filter(
            content,
            removed_tool_names,
            index == checkpoint,
            &removed_tool_use_ids,
        );
        removed_tool_use_ids.extend(outcome.new_removed_ids);

        match outcome.filtered {
            Some(filtered) if !filtered.is_empty() => {
                let mut kept = message.clone();
                kept.full_content = Some(filtered);
                out.push(kept);
            }
            _ => dropped += 1,
        }
    }

    out.extend(messages[checkpoint + 1..].iter().cloned());

    tracing::debug!(
        family = %family,
        dropped,
        removed_tool_uses = removed_tool_use_ids.len(),
        "Tidied history"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::providers::anthropic::AnthropicBlock;
    use serde_json::json;

    fn names(list: &[&str]) -> HashSet<String> {
        list.iter().map(ToString::to_string).collect()
    }

    fn thinking() -> AnthropicBlock {
        AnthropicBlock::Thinking {
            thinking: "hmm".to_string(),
            signature: "sig".to_string(),
        }
    }

    fn tool_use(id: &str, name: &str) -> AnthropicBlock {
        AnthropicBlock::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input: json!({}),
        }
    }

    fn tool_result(id: &str) -> AnthropicBlock {
        AnthropicBlock::ToolResult {
            tool_use_id: id.to_string(),
            content: json!("ok"),
            is_error: None,
        }
    }

    fn assistant(id: &str, blocks: Vec<AnthropicBlock>) -> Message {
        Message::assistant(FullContent::Anthropic(blocks)).with_id(id)
    }

    fn tool_turn(id: &str, blocks: Vec<AnthropicBlock>) -> Message {
        Message::with_content(Role::User, FullContent::Anthropic(blocks)).with_id(id)
    }

    fn ids(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_removed_tool_takes_its_result() {
        let messages = vec![
            assistant("a1", vec![thinking(), tool_use("t1", "search")]),
            tool_turn("r1", vec![tool_result("t1")]),
            assistant("a2", vec![AnthropicBlock::text("done")]),
        ];
        let out = tidy_history(
            &messages,
            Some("a2"),
            &names(&["search"]),
            ModelFamily::Anthropic,
            filter_for(ModelFamily::Anthropic),
        );
        assert_eq!(ids(&out), vec!["a2"]);
        assert_eq!(messages.len(), 3);
    }

    #[test]
    fn test_no_checkpoint_is_noop() {
        let messages = vec![assistant("a1", vec![thinking(), AnthropicBlock::text("x")])];
        let out = tidy_history(
            &messages,
            None,
            &names(&["search"]),
            ModelFamily::Anthropic,
            filter_for(ModelFamily::Anthropic),
        );
        assert_eq!(out, messages);

        let out = tidy_history(
            &messages,
            Some("missing"),
            &HashSet::new(),
            ModelFamily::Anthropic,
            filter_for(ModelFamily::Anthropic),
        );
        assert_eq!(out, messages);
    }

    #[test]
    fn test_checkpoint_keeps_tools_but_loses_reasoning() {
        let messages = vec![assistant(
            "cp",
            vec![thinking(), AnthropicBlock::text("t"), tool_use("t1", "search")],
        )];
        let out = tidy_history(
            &messages,
            Some("cp"),
            &names(&["search"]),
            ModelFamily::Anthropic,
            filter_for(ModelFamily::Anthropic),
        );
        assert_eq!(
            out[0].full_content,
            Some(FullContent::Anthropic(vec![
                AnthropicBlock::text("t"),
                tool_use("t1", "search"),
            ]))
        );
    }

    #[test]
    fn test_messages_after_checkpoint_untouched() {
        let messages = vec![
            assistant("a1", vec![thinking(), AnthropicBlock::text("one")]),
            assistant("a2", vec![thinking(), AnthropicBlock::text("two")]),
        ];
        let out = tidy_history(
            &messages,
            Some("a1"),
            &HashSet::new(),
            ModelFamily::Anthropic,
            filter_for(ModelFamily::Anthropic),
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], messages[1]);
        assert_eq!(
            out[0].full_content,
            Some(FullContent::Anthropic(vec![AnthropicBlock::text("one")]))
        );
    }

    #[test]
    fn test_other_family_and_plain_messages_pass_through() {
        let bedrock = Message::assistant(FullContent::Bedrock(vec![
            crate::providers::bedrock::types::BedrockBlock::Text("b".to_string()),
        ]))
        .with_id("b1");
        let user = Message::user("hello").with_id("u1");
        let messages = vec![bedrock.clone(), user.clone(), assistant("cp", vec![thinking()])];
        let out = tidy_history(
            &messages,
            Some("cp"),
            &HashSet::new(),
            ModelFamily::Anthropic,
            filter_for(ModelFamily::Anthropic),
        );
        assert_eq!(out, vec![bedrock, user]);
    }

    #[test]
    fn test_filter_sees_ids_in_oldest_first_order() {
        let messages = vec![
            assistant("a1", vec![tool_use("t1", "x")]),
            tool_turn("r1", vec![tool_result("t1")]),
            assistant("cp", vec![AnthropicBlock::text("y")]),
        ];
        let mut seen = Vec::new();
        let _ = tidy_history(
            &messages,
            Some("cp"),
            &names(&["x"]),
            ModelFamily::Anthropic,
            |content: &FullContent, n: &HashSet<String>, cp: bool, ids: &HashSet<String>| {
                seen.push((cp, ids.len()));
                filter_for(ModelFamily::Anthropic)(content, n, cp, ids)
            },
        );
        assert_eq!(seen, vec![(false, 0), (false, 1), (true, 1)]);
    }
}
