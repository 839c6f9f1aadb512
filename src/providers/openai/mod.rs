//! `OpenAI` Responses API.

pub mod accumulator;
pub mod converter;
pub mod filter;
pub mod mapper;
pub mod types;

use crate::error::{ErrorInfo, Result};
use crate::message::FullContent;
use crate::normalized::StreamEvent;

use super::{Mapped, ModelFamily, WireProtocol};

pub use accumulator::ResponsesAccumulator;
pub use mapper::ResponsesState;
pub use types::{OutputItem, ResponsesEvent, ResponsesResponse};

/// Marker type wiring the Responses pieces into the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiResponses;

fn status_for_code(code: Option<&str>) -> Option<u16> {
    match code? {
        "invalid_request_error" | "invalid_prompt" => Some(400),
        "invalid_api_key" => Some(401),
        "rate_limit_exceeded" | "insufficient_quota" => Some(429),
        "server_error" => Some(500),
        "server_is_overloaded" | "slow_down" => Some(503),
        _ => None,
    }
}

impl WireProtocol for OpenAiResponses {
    const FAMILY: ModelFamily = ModelFamily::OpenAi;

    type RawEvent = ResponsesEvent;
    type State = ResponsesState;
    type Response = ResponsesResponse;
    type Accumulator = ResponsesAccumulator;

    fn parse_frame(_event: &str, data: &str) -> Result<Option<ResponsesEvent>> {
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(data)?))
    }

    fn map_event(raw: &ResponsesEvent, state: ResponsesState) -> Mapped<ResponsesState> {
        mapper::map_event(raw, state)
    }

    fn finish(state: ResponsesState) -> Mapped<ResponsesState> {
        mapper::finish(state)
    }

    fn is_terminal(raw: &ResponsesEvent) -> bool {
        matches!(
            raw,
            ResponsesEvent::Completed { .. } | ResponsesEvent::Incomplete { .. }
        )
    }

    fn error_info(raw: &ResponsesEvent) -> Option<ErrorInfo> {
        let (code, message) = match raw {
            ResponsesEvent::Error { code, message } => (code.as_deref(), message.clone()),
            ResponsesEvent::Failed { response } => {
                let error = response.error.as_ref();
                (
                    error.and_then(|e| e.code.as_deref()),
                    error
                        .map(|e| e.message.clone())
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| "Response failed".to_string()),
                )
            }
            _ => return None,
        };
        let info = ErrorInfo::new(message);
        Some(match status_for_code(code) {
            Some(status) => info.with_status(status),
            None => info,
        })
    }

    fn convert_response(response: &ResponsesResponse) -> Vec<StreamEvent> {
        converter::convert_response(response)
    }

    fn observe(acc: &mut ResponsesAccumulator, raw: &ResponsesEvent) {
        acc.observe(raw);
    }

    fn accumulate_response(response: &ResponsesResponse) -> ResponsesAccumulator {
        ResponsesAccumulator::from_response(response)
    }

    fn full_content(acc: ResponsesAccumulator) -> FullContent {
        FullContent::OpenAi(acc.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_response_reports_error() {
        let raw = OpenAiResponses::parse_frame(
            "response.failed",
            r#"{"type":"response.failed","response":{"status":"failed","error":{"code":"rate_limit_exceeded","message":"Slow down"}}}"#,
        )
        .unwrap()
        .unwrap();
        let info = OpenAiResponses::error_info(&raw).unwrap();
        assert_eq!(info.message, "Slow down");
        assert_eq!(info.status, Some(429));
        assert!(!OpenAiResponses::is_terminal(&raw));
    }

    #[test]
    fn test_done_sentinel_is_ignored() {
        assert!(OpenAiResponses::parse_frame("", "[DONE]").unwrap().is_none());
    }
}
