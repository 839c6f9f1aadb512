//! AWS Bedrock Converse stream.

pub mod accumulator;
pub mod converter;
pub mod filter;
pub mod mapper;
pub mod types;

use serde_json::Value;

use crate::error::{ErrorInfo, Result, StreamError};
use crate::message::FullContent;
use crate::normalized::StreamEvent;

use super::{Mapped, ModelFamily, WireProtocol, frame_name};

pub use accumulator::BedrockAccumulator;
pub use mapper::BedrockState;
pub use types::{BedrockBlock, BedrockEvent, ConverseResponse};

/// Marker type wiring the Converse pieces into the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bedrock;

impl WireProtocol for Bedrock {
    const FAMILY: ModelFamily = ModelFamily::Bedrock;

    type RawEvent = BedrockEvent;
    type State = BedrockState;
    type Response = ConverseResponse;
    type Accumulator = BedrockAccumulator;

    fn parse_frame(event: &str, data: &str) -> Result<Option<BedrockEvent>> {
        let data = data.trim();
        if data.is_empty() {
            return Ok(None);
        }
        let value: Value = serde_json::from_str(data)?;

        if let Some(name) = frame_name(event) {
            let body = match value {
                Value::Object(mut map) if map.len() == 1 && map.contains_key(name) => {
                    map.remove(name).unwrap_or_default()
                }
                other => other,
            };
            return BedrockEvent::from_named(name, body);
        }

        match value {
            Value::Object(map) if map.len() == 1 => {
                let Some((name, body)) = map.into_iter().next() else {
                    return Ok(None);
                };
                BedrockEvent::from_named(&name, body)
            }
            _ => Err(StreamError::Sse(
                "Bedrock frame carries neither an event name nor a single outer key".to_string(),
            )),
        }
    }

    fn map_event(raw: &BedrockEvent, state: BedrockState) -> Mapped<BedrockState> {
        mapper::map_event(raw, state)
    }

    fn finish(state: BedrockState) -> Mapped<BedrockState> {
        mapper::finish(state)
    }

    fn is_terminal(raw: &BedrockEvent) -> bool {
        matches!(raw, BedrockEvent::MessageStop(_) | BedrockEvent::Metadata(_))
    }

    fn error_info(raw: &BedrockEvent) -> Option<ErrorInfo> {
        let BedrockEvent::Exception { kind, message } = raw else {
            return None;
        };
        let status = match kind.as_str() {
            "validationException" => Some(400),
            "throttlingException" => Some(429),
            "internalServerException" => Some(500),
            "serviceUnavailableException" => Some(503),
            _ => None,
        };
        let text = if message.is_empty() {
            kind.clone()
        } else {
            format!("{kind}: {message}")
        };
        let info = ErrorInfo::new(text);
        Some(match status {
            Some(status) => info.with_status(status),
            None => info,
        })
    }

    fn convert_response(response: &ConverseResponse) -> Vec<StreamEvent> {
        converter::convert_response(response)
    }

    fn observe(acc: &mut BedrockAccumulator, raw: &BedrockEvent) {
        acc.observe(raw);
    }

    fn accumulate_response(response: &ConverseResponse) -> BedrockAccumulator {
        BedrockAccumulator::from_response(response)
    }

    fn full_content(acc: BedrockAccumulator) -> FullContent {
        FullContent::Bedrock(acc.finalize())
    }
}
