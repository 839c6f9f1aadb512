//! Anthropic Messages API.

pub mod accumulator;
pub mod converter;
pub mod filter;
pub mod mapper;
pub mod types;

use crate::error::{ErrorInfo, Result};
use crate::message::FullContent;
use crate::normalized::StreamEvent;

use super::{Mapped, ModelFamily, WireProtocol};

pub use accumulator::AnthropicAccumulator;
pub use mapper::AnthropicState;
pub use types::{AnthropicBlock, AnthropicEvent, AnthropicResponse};

/// Marker type wiring the Anthropic pieces into the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anthropic;

impl WireProtocol for Anthropic {
    const FAMILY: ModelFamily = ModelFamily::Anthropic;

    type RawEvent = AnthropicEvent;
    type State = AnthropicState;
    type Response = AnthropicResponse;
    type Accumulator = AnthropicAccumulator;

    fn parse_frame(_event: &str, data: &str) -> Result<Option<AnthropicEvent>> {
        // The `type` field in the payload repeats the SSE event name.
        if data.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(data)?))
    }

    fn map_event(raw: &AnthropicEvent, state: AnthropicState) -> Mapped<AnthropicState> {
        mapper::map_event(raw, state)
    }

    fn finish(state: AnthropicState) -> Mapped<AnthropicState> {
        mapper::finish(state)
    }

    fn is_terminal(raw: &AnthropicEvent) -> bool {
        matches!(raw, AnthropicEvent::MessageStop)
    }

    fn error_info(raw: &AnthropicEvent) -> Option<ErrorInfo> {
        let AnthropicEvent::Error { error } = raw else {
            return None;
        };
        let status = match error.kind.as_str() {
            "invalid_request_error" => Some(400),
            "authentication_error" => Some(401),
            "permission_error" => Some(403),
            "not_found_error" => Some(404),
            "rate_limit_error" => Some(429),
            "api_error" => Some(500),
            "overloaded_error" => Some(529),
            _ => None,
        };
        let message = if error.message.is_empty() {
            error.kind.clone()
        } else {
            error.message.clone()
        };
        let info = ErrorInfo::new(message);
        Some(match status {
            Some(status) => info.with_status(status),
            None => info,
        })
    }

    fn convert_response(response: &AnthropicResponse) -> Vec<StreamEvent> {
        converter::convert_response(response)
    }

    fn observe(acc: &mut AnthropicAccumulator, raw: &AnthropicEvent) {
        acc.observe(raw);
    }

    fn accumulate_response(response: &AnthropicResponse) -> AnthropicAccumulator {
        AnthropicAccumulator::from_response(response)
    }

    fn full_content(acc: AnthropicAccumulator) -> FullContent {
        FullContent::Anthropic(acc.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_skips_empty_data() {
        assert!(Anthropic::parse_frame("ping", "").unwrap().is_none());
        assert_eq!(
            Anthropic::parse_frame("message_stop", r#"{"type":"message_stop"}"#).unwrap(),
            Some(AnthropicEvent::MessageStop)
        );
    }

    #[test]
    fn test_parse_frame_rejects_malformed_json() {
        assert!(Anthropic::parse_frame("content_block_delta", "{not json").is_err());
    }

    #[test]
    fn test_error_event_maps_status() {
        let raw = Anthropic::parse_frame(
            "error",
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        )
        .unwrap()
        .unwrap();
        let info = Anthropic::error_info(&raw).unwrap();
        assert_eq!(info.message, "Overloaded");
        assert_eq!(info.status, Some(529));
        assert!(!Anthropic::is_terminal(&raw));
    }
}
