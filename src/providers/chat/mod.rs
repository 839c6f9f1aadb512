//! OpenAI-compatible Chat Completions.
//!
//! Hosted gateways and on-device engines that speak the chat completions
//! chunk format all land here.

pub mod accumulator;
pub mod converter;
pub mod filter;
pub mod mapper;
pub mod types;

use serde_json::Value;

use crate::error::{ErrorInfo, Result};
use crate::message::FullContent;
use crate::normalized::StreamEvent;

use super::{Mapped, ModelFamily, WireProtocol};

pub use accumulator::ChatAccumulator;
pub use mapper::ChatState;
pub use types::{ChatCompletion, ChatEvent, ChatPart};

/// Id for a streamed tool call whose chunks never carried one.
///
/// Some local engines omit `id` entirely; the call index keeps the result
/// pairing stable within the turn.
pub(crate) fn fallback_call_id(index: usize) -> String {
    format!("call_{index}")
}

/// Marker type wiring the Chat Completions pieces into the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatCompletions;

impl WireProtocol for ChatCompletions {
    const FAMILY: ModelFamily = ModelFamily::Chat;

    type RawEvent = ChatEvent;
    type State = ChatState;
    type Response = ChatCompletion;
    type Accumulator = ChatAccumulator;

    fn parse_frame(_event: &str, data: &str) -> Result<Option<ChatEvent>> {
        match data.trim() {
            "" => Ok(None),
            "[DONE]" => Ok(Some(ChatEvent::Done)),
            json => Ok(Some(ChatEvent::Chunk(serde_json::from_str(json)?))),
        }
    }

    fn map_event(raw: &ChatEvent, state: ChatState) -> Mapped<ChatState> {
        mapper::map_event(raw, state)
    }

    fn finish(state: ChatState) -> Mapped<ChatState> {
        mapper::finish(state)
    }

    fn is_terminal(raw: &ChatEvent) -> bool {
        matches!(raw, ChatEvent::Done)
    }

    fn error_info(raw: &ChatEvent) -> Option<ErrorInfo> {
        let ChatEvent::Chunk(chunk) = raw else {
            return None;
        };
        let error = chunk.error.as_ref()?;
        let info = ErrorInfo::new(error.message.clone());
        let status = error
            .code
            .as_ref()
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok());
        Some(match status {
            Some(status) => info.with_status(status),
            None => info,
        })
    }

    fn convert_response(response: &ChatCompletion) -> Vec<StreamEvent> {
        converter::convert_response(response)
    }

    fn observe(acc: &mut ChatAccumulator, raw: &ChatEvent) {
        acc.observe(raw);
    }

    fn accumulate_response(response: &ChatCompletion) -> ChatAccumulator {
        ChatAccumulator::from_response(response)
    }

    fn full_content(acc: ChatAccumulator) -> FullContent {
        FullContent::Chat(acc.finalize())
    }
}
