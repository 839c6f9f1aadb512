use futures::{StreamExt, stream};
use serde_json::json;
use unistream::{ModelFamily, StreamError};
use unistream::assembler::{ContentBlock, GroupCategory, SearchHit};
use unistream::normalized::{StreamEvent, sse_event};
use unistream::pipeline::{collect_turn, normalize_sse_for};

fn body(lines: &[serde_json::Value]) -> Vec<std::io::Result<String>> {
    lines
        .iter()
        .map(|line| Ok(format!("data: {line}\n\n")))
        .collect()
}

#[tokio::test]
async fn test_anthropic_web_search_turn() {
    let chunks = body(&[
        json!({"type": "message_start", "message": {"usage": {"input_tokens": 3}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "server_tool_use", "id": "ws1", "name": "web_search", "input": {}}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": "{\"query\":\"rust\"}"}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "content_block_start", "index": 1, "content_block": {"type": "web_search_tool_result", "tool_use_id": "ws1", "content": [
            {"type": "web_search_result", "title": "Rust", "url": "https://rust-lang.org"}
        ]}}),
        json!({"type": "content_block_stop", "index": 1}),
        json!({"type": "content_block_start", "index": 2, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "content_block_delta", "index": 2, "delta": {"type": "citations_delta", "citation": {
            "type": "web_search_result_location", "url": "https://rust-lang.org", "title": "Rust", "cited_text": "fast"
        }}}),
        json!({"type": "content_block_delta", "index": 2, "delta": {"type": "text_delta", "text": "Rust is fast."}}),
        json!({"type": "content_block_stop", "index": 2}),
        json!({"type": "message_stop"}),
    ]);

    let turn = collect_turn(ModelFamily::Anthropic, stream::iter(chunks)).await;

    assert!(turn.error.is_none());
    assert_eq!(turn.groups.len(), 2);
    assert_eq!(
        turn.groups[0].blocks,
        vec![ContentBlock::WebSearch {
            id: "ws1".to_string(),
            query: "rust".to_string(),
            results: vec![SearchHit {
                title: Some("Rust".to_string()),
                url: Some("https://rust-lang.org".to_string()),
            }],
        }]
    );
    let ContentBlock::Text { text, citations } = &turn.groups[1].blocks[0] else {
        panic!("expected a text block");
    };
    assert_eq!(text, "Rust is fast.");
    assert_eq!(citations.len(), 1);
    assert_eq!(turn.full_content.len(), 3);
}

#[tokio::test]
async fn test_openai_failed_response_reports_error() {
    let chunks = body(&[
        json!({"type": "response.output_text.delta", "output_index": 0, "content_index": 0, "delta": "partial"}),
        json!({"type": "response.failed", "response": {"status": "failed", "error": {"code": "server_error", "message": "boom"}}}),
    ]);

    let turn = collect_turn(ModelFamily::OpenAi, stream::iter(chunks)).await;

    let error = turn.error.expect("turn should fail");
    assert_eq!(error.message, "boom");
    assert_eq!(error.status, Some(500));
    let categories: Vec<_> = turn.groups.iter().map(|g| g.category).collect();
    assert_eq!(categories, vec![GroupCategory::Text, GroupCategory::Error]);
    assert_eq!(turn.full_content.display_text(), "partial");
}

#[tokio::test]
async fn test_bedrock_without_metadata_still_completes() {
    let chunks: Vec<std::io::Result<String>> = vec![
        Ok("event: contentBlockDelta\ndata: {\"contentBlockIndex\":0,\"delta\":{\"text\":\"hi\"}}\n\n".to_string()),
        Ok("event: messageStop\ndata: {\"stopReason\":\"end_turn\"}\n\n".to_string()),
    ];

    let turn = collect_turn(ModelFamily::Bedrock, stream::iter(chunks)).await;

    assert!(turn.error.is_none());
    assert_eq!(turn.full_content.display_text(), "hi");
    assert!(matches!(turn.events.last(), Some(StreamEvent::TokenUsage(_))));
}

#[tokio::test]
async fn test_normalized_events_reencode_as_sse() {
    let mut chunks = body(&[
        json!({"choices": [{"index": 0, "delta": {"reasoning": "hmm"}}]}),
        json!({"choices": [{"index": 0, "delta": {"content": "ok"}, "finish_reason": "stop"}]}),
    ]);
    chunks.push(Ok("data: [DONE]\n\n".to_string()));

    let frames: Vec<String> = normalize_sse_for(ModelFamily::Chat, stream::iter(chunks))
        .map(|event| sse_event(&event.unwrap()))
        .collect()
        .await;

    let names: Vec<&str> = frames
        .iter()
        .filter_map(|f| f.lines().next()?.strip_prefix("event: "))
        .collect();
    assert_eq!(
        names,
        vec![
            "thinking.start",
            "thinking",
            "thinking.end",
            "content.start",
            "content",
            "content.end",
            "token_usage",
        ]
    );
}

#[tokio::test]
async fn test_truncated_stream_reports_incomplete() {
    let frames = [
        json!({"type": "message_start", "message": {"usage": {"input_tokens": 3}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "cut"}}),
    ];

    let items: Vec<_> = normalize_sse_for(ModelFamily::Anthropic, stream::iter(body(&frames)))
        .collect()
        .await;
    let names: Vec<&str> = items
        .iter()
        .filter_map(|item| item.as_ref().ok())
        .map(unistream::normalized::event_name)
        .collect();
    assert_eq!(names, vec!["content.start", "content", "content.end", "token_usage"]);
    assert!(matches!(items.last(), Some(Err(StreamError::Incomplete))));

    let turn = collect_turn(ModelFamily::Anthropic, stream::iter(body(&frames))).await;
    let error = turn.error.expect("truncated turn should fail");
    assert_eq!(error.message, StreamError::Incomplete.to_string());
}

#[tokio::test]
async fn test_in_band_failure_ends_normalized_stream_with_error() {
    let chunks = body(&[
        json!({"type": "response.output_text.delta", "output_index": 0, "content_index": 0, "delta": "partial"}),
        json!({"type": "response.failed", "response": {"status": "failed", "error": {"code": "server_error", "message": "boom"}}}),
    ]);

    let items: Vec<_> = normalize_sse_for(ModelFamily::OpenAi, stream::iter(chunks))
        .collect()
        .await;

    let Some(Err(StreamError::Transport { message, status })) = items.last() else {
        panic!("expected a trailing transport error, got {items:?}");
    };
    assert_eq!(message, "boom");
    assert_eq!(*status, Some(500));
    assert_eq!(items.iter().filter(|item| item.is_err()).count(), 1);
}
