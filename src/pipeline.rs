//! Async stream driver.
//!
//! Raw provider bytes go through SSE framing (`eventsource-stream`), the
//! family's frame decoder and its mapper. [`collect_turn`] additionally feeds
//! the content assembler and the full-content accumulator from the same
//! decoded events, so a turn is read from the wire exactly once.
//!
//! ```text
//! bytes ─► SSE frames ─► RawEvent ─┬─► mapper ─► StreamEvent ─► assembler ─► groups
//!                                  └─► accumulator ─────────────────────────► full content
//! ```
//!
//! Malformed frames are logged and skipped. A transport failure ends the
//! stream; [`collect_turn`] reports it next to whatever was assembled so far.

use std::fmt;

use eventsource_stream::{EventStreamError, Eventsource};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde::Serialize;

use crate::assembler::{ContentAssembler, ContentGroup};
use crate::error::{ErrorInfo, Result, StreamError};
use crate::message::FullContent;
use crate::normalized::{StreamEvent, TokenUsage};
use crate::providers::{
    Anthropic, Bedrock, ChatCompletions, Mapped, ModelFamily, OpenAiResponses, WireProtocol,
};

/// Everything produced by one assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutput {
    /// Normalized events in emission order.
    pub events: Vec<StreamEvent>,
    /// Display groups; ends with an error group when `error` is set.
    pub groups: Vec<ContentGroup>,
    /// Provider-native content for persistence and resubmission.
    pub full_content: FullContent,
    pub usage: Option<TokenUsage>,
    /// Why the turn is incomplete, if it is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Decode SSE frames into the family's raw events.
fn raw_events<P, S, B, E>(bytes: S) -> impl Stream<Item = Result<P::RawEvent>>
where
    P: WireProtocol,
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    async_stream::stream! {
        let frames = bytes.eventsource();
        futures::pin_mut!(frames);

        while let Some(frame) = frames.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(EventStreamError::Transport(e)) => {
                    yield Err(StreamError::Transport {
                        message: e.to_string(),
                        status: None,
                    });
                    return;
                }
                Err(e) => {
                    tracing::warn!(family = %P::FAMILY, error = %e, "Skipping undecodable SSE frame");
                    continue;
                }
            };

            match P::parse_frame(&frame.event, &frame.data) {
                Ok(Some(raw)) => yield Ok(raw),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        family = %P::FAMILY,
                        event = %frame.event,
                        error = %e,
                        data_length = frame.data.len(),
                        "Skipping malformed frame"
                    );
                }
            }
        }
    }
}

/// Normalize a provider byte stream into [`StreamEvent`]s.
///
/// The family's end-of-stream hook always runs when the bytes run out, so
/// every opened block is closed even if the terminal event never arrived.
/// A turn that did not complete still ends in an error after those events:
/// [`StreamError::Transport`] for a failure the provider reported in-band,
/// [`StreamError::Incomplete`] when the terminal event is missing.
pub fn normalize_sse<P, S, B, E>(bytes: S) -> impl Stream<Item = Result<StreamEvent>>
where
    P: WireProtocol,
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    async_stream::stream! {
        let raw = raw_events::<P, _, _, _>(bytes);
        futures::pin_mut!(raw);
        let mut state = P::State::default();
        let mut failure: Option<ErrorInfo> = None;
        let mut terminal = false;

        while let Some(item) = raw.next().await {
            match item {
                Ok(event) => {
                    if failure.is_none() {
                        failure = P::error_info(&event);
                    }
                    terminal |= P::is_terminal(&event);
                    let Mapped { events, state: next } = P::map_event(&event, state);
                    state = next;
                    for event in events {
                        yield Ok(event);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        let Mapped { events, .. } = P::finish(state);
        for event in events {
            yield Ok(event);
        }

        if let Some(info) = failure {
            yield Err(StreamError::Transport {
                message: info.message,
                status: info.status,
            });
        } else if !terminal {
            tracing::warn!(family = %P::FAMILY, "Stream ended before its terminal event");
            yield Err(StreamError::Incomplete);
        }
    }
}

/// [`normalize_sse`] with the family chosen at runtime.
pub fn normalize_sse_for<S, B, E>(
    family: ModelFamily,
    bytes: S,
) -> BoxStream<'static, Result<StreamEvent>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    match family {
        ModelFamily::Anthropic => normalize_sse::<Anthropic, _, _, _>(bytes).boxed(),
        ModelFamily::OpenAi => normalize_sse::<OpenAiResponses, _, _, _>(bytes).boxed(),
        ModelFamily::Bedrock => normalize_sse::<Bedrock, _, _, _>(bytes).boxed(),
        ModelFamily::Chat => normalize_sse::<ChatCompletions, _, _, _>(bytes).boxed(),
    }
}

/// Drive one streamed turn to completion.
///
/// `error` is set when the transport failed, the provider reported a failure
/// in-band, or the stream ended before the family's terminal event. Content
/// received before the failure is kept.
pub async fn collect_turn_as<P, S, B, E>(bytes: S) -> TurnOutput
where
    P: WireProtocol,
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    let raw = raw_events::<P, _, _, _>(bytes);
    futures::pin_mut!(raw);

    let mut state = P::State::default();
    let mut accumulator = P::Accumulator::default();
    let mut assembler = ContentAssembler::new();
    let mut events = Vec::new();
    let mut error: Option<ErrorInfo> = None;
    let mut terminal = false;

    while let Some(item) = raw.next().await {
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                error = Some(ErrorInfo::from(&e));
                break;
            }
        };
        if error.is_none() {
            error = P::error_info(&event);
        }
        terminal |= P::is_terminal(&event);
        P::observe(&mut accumulator, &event);

        let Mapped { events: step, state: next } = P::map_event(&event, state);
        state = next;
        for event in &step {
            assembler.apply(event);
        }
        events.extend(step);
    }

    let Mapped { events: tail, .. } = P::finish(state);
    for event in &tail {
        assembler.apply(event);
    }
    events.extend(tail);

    if error.is_none() && !terminal {
        error = Some(ErrorInfo::incomplete_stream());
    }

    let usage = assembler.usage();
    let groups = match &error {
        Some(info) => {
            tracing::warn!(
                family = %P::FAMILY,
                reason = %info.message,
                status = ?info.status,
                "Turn ended with an error"
            );
            assembler.finalize_with_error(info.clone())
        }
        None => assembler.into_groups(),
    };
    let full_content = P::full_content(accumulator);

    tracing::info!(
        family = %P::FAMILY,
        events = events.len(),
        groups = groups.len(),
        blocks = full_content.len(),
        "Turn complete"
    );

    TurnOutput {
        events,
        groups,
        full_content,
        usage,
        error,
    }
}

/// [`collect_turn_as`] with the family chosen at runtime.
pub async fn collect_turn<S, B, E>(family: ModelFamily, bytes: S) -> TurnOutput
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    match family {
        ModelFamily::Anthropic => collect_turn_as::<Anthropic, _, _, _>(bytes).await,
        ModelFamily::OpenAi => collect_turn_as::<OpenAiResponses, _, _, _>(bytes).await,
        ModelFamily::Bedrock => collect_turn_as::<Bedrock, _, _, _>(bytes).await,
        ModelFamily::Chat => collect_turn_as::<ChatCompletions, _, _, _>(bytes).await,
    }
}

/// Run the non-streaming path over a complete response body.
///
/// # Errors
///
/// Returns [`StreamError::Json`] when the body is not a valid response.
pub fn convert_complete_as<P: WireProtocol>(json: &str) -> Result<TurnOutput> {
    let response: P::Response = serde_json::from_str(json)?;
    let events = P::convert_response(&response);

    let mut assembler = ContentAssembler::new();
    for event in &events {
        assembler.apply(event);
    }
    let usage = assembler.usage();
    let full_content = P::full_content(P::accumulate_response(&response));

    Ok(TurnOutput {
        events,
        groups: assembler.into_groups(),
        full_content,
        usage,
        error: None,
    })
}

/// [`convert_complete_as`] with the family chosen at runtime.
///
/// # Errors
///
/// Returns [`StreamError::Json`] when the body is not a valid response.
pub fn convert_complete(family: ModelFamily, json: &str) -> Result<TurnOutput> {
    match family {
        ModelFamily::Anthropic => convert_complete_as::<Anthropic>(json),
        ModelFamily::OpenAi => convert_complete_as::<OpenAiResponses>(json),
        ModelFamily::Bedrock => convert_complete_as::<Bedrock>(json),
        ModelFamily::Chat => convert_complete_as::<ChatCompletions>(json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::GroupCategory;
    use futures::stream;

    fn bytes(chunks: Vec<&'static str>) -> impl Stream<Item = std::io::Result<&'static str>> {
        stream::iter(chunks.into_iter().map(Ok))
    }

    const CHAT_STREAM: &str = "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n\
data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n\
data: [DONE]\n\n";

    #[tokio::test]
    async fn test_normalize_chat_stream() {
        let events: Vec<StreamEvent> = normalize_sse::<ChatCompletions, _, _, _>(bytes(vec![CHAT_STREAM]))
            .map(|e| e.unwrap())
            .collect()
            .await;
        assert_eq!(events.first(), Some(&StreamEvent::ContentStart));
        assert!(events.contains(&StreamEvent::content("Hel")));
        assert!(events.contains(&StreamEvent::ContentEnd));
    }

    #[tokio::test]
    async fn test_frames_split_across_chunks() {
        let (a, b) = CHAT_STREAM.split_at(30);
        let whole = collect_turn(ModelFamily::Chat, bytes(vec![CHAT_STREAM])).await;
        let split = collect_turn(ModelFamily::Chat, bytes(vec![a, b])).await;
        assert_eq!(whole, split);
        assert!(whole.error.is_none());
        assert_eq!(whole.full_content.display_text(), "Hello");
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let turn = collect_turn(
            ModelFamily::Chat,
            bytes(vec![
                "data: {not json\n\n",
                "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"ok\"}}]}\n\n",
                "data: [DONE]\n\n",
            ]),
        )
        .await;
        assert!(turn.error.is_none());
        assert_eq!(turn.full_content.display_text(), "ok");
    }

    #[tokio::test]
    async fn test_missing_terminal_event_is_an_error() {
        let turn = collect_turn(
            ModelFamily::Chat,
            bytes(vec![
                "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"partial\"}}]}\n\n",
            ]),
        )
        .await;
        assert_eq!(turn.error, Some(ErrorInfo::incomplete_stream()));
        assert!(turn.events.contains(&StreamEvent::ContentEnd));
        assert!(matches!(turn.events.last(), Some(StreamEvent::TokenUsage(_))));
        let categories: Vec<_> = turn.groups.iter().map(|g| g.category).collect();
        assert_eq!(categories, vec![GroupCategory::Text, GroupCategory::Error]);
    }

    #[tokio::test]
    async fn test_transport_error_keeps_partial_content() {
        let chunks: Vec<std::io::Result<&'static str>> = vec![
            Ok("data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"so far\"}}]}\n\n"),
            Err(std::io::Error::other("connection reset")),
        ];
        let turn = collect_turn(ModelFamily::Chat, stream::iter(chunks)).await;
        let error = turn.error.unwrap();
        assert!(error.message.contains("connection reset"));
        assert_eq!(turn.groups.len(), 2);
        assert_eq!(turn.full_content.display_text(), "so far");
    }

    #[tokio::test]
    async fn test_transport_error_ends_normalized_stream() {
        let chunks: Vec<std::io::Result<&'static str>> = vec![Err(std::io::Error::other("down"))];
        let items: Vec<_> = normalize_sse_for(ModelFamily::Anthropic, stream::iter(chunks))
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(StreamError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_truncated_stream_ends_with_incomplete() {
        let items: Vec<_> = normalize_sse::<ChatCompletions, _, _, _>(bytes(vec![
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"partial\"}}]}\n\n",
        ]))
        .collect()
        .await;

        let (last, events) = items.split_last().unwrap();
        assert!(matches!(last, Err(StreamError::Incomplete)));
        assert!(events.iter().all(Result::is_ok));
        assert!(matches!(
            events.last(),
            Some(Ok(StreamEvent::TokenUsage(_)))
        ));
    }

    #[test]
    fn test_convert_complete_rejects_bad_json() {
        assert!(matches!(
            convert_complete(ModelFamily::OpenAi, "not json"),
            Err(StreamError::Json(_))
        ));
    }
}
