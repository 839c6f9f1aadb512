//! Rebuilds the Responses output items of a turn, keyed by output index.

use std::collections::BTreeMap;

use super::types::{MessagePart, OutputItem, ReasoningPart, ResponsesEvent, ResponsesResponse};

/// Full-content accumulator for Responses turns.
///
/// Deltas grow the item announced by `output_item.added`; the item carried by
/// `output_item.done` is authoritative and replaces whatever was accumulated.
#[derive(Debug, Default, Clone)]
pub struct ResponsesAccumulator {
    items: BTreeMap<usize, OutputItem>,
}

impl ResponsesAccumulator {
    #[must_use]
    pub fn from_response(response: &ResponsesResponse) -> Self {
        Self {
            items: response.output.iter().cloned().enumerate().collect(),
        }
    }

    pub fn observe(&mut self, event: &ResponsesEvent) {
        match event {
            ResponsesEvent::OutputItemAdded { output_index, item }
            | ResponsesEvent::OutputItemDone { output_index, item } => {
                self.items.insert(*output_index, item.clone());
            }
            ResponsesEvent::OutputTextDelta {
                output_index,
                content_index,
                delta,
            } => {
                if let Some(MessagePart::OutputText { text, .. }) =
                    self.message_part(*output_index, *content_index)
                {
                    text.push_str(delta);
                }
            }
            ResponsesEvent::RefusalDelta {
                output_index,
                content_index,
                delta,
            } => {
                if let Some(part) = self.message_part(*output_index, *content_index) {
                    if matches!(part, MessagePart::OutputText { text, .. } if text.is_empty()) {
                        *part = MessagePart::Refusal {
                            refusal: String::new(),
                        };
                    }
                    if let MessagePart::Refusal { refusal } = part {
                        refusal.push_str(delta);
                    }
                }
            }
            ResponsesEvent::AnnotationAdded {
                output_index,
                content_index,
                annotation,
            } => {
                if let Some(MessagePart::OutputText { annotations, .. }) =
                    self.message_part(*output_index, *content_index)
                {
                    annotations.push(annotation.clone());
                }
            }
            ResponsesEvent::ReasoningSummaryDelta {
                output_index,
                summary_index,
                delta,
            } => self.push_reasoning(*output_index, *summary_index, delta, true),
            ResponsesEvent::ReasoningTextDelta {
                output_index,
                content_index,
                delta,
            } => self.push_reasoning(*output_index, *content_index, delta, false),
            ResponsesEvent::FunctionCallArgumentsDelta {
                output_index,
                delta,
                ..
            } => {
                if let Some(OutputItem::FunctionCall { arguments, .. }) =
                    self.items.get_mut(output_index)
                {
                    arguments.push_str(delta);
                }
            }
            _ => {}
        }
    }

    /// The message part at `(output_index, content_index)`, created on demand.
    fn message_part(&mut self, output_index: usize, content_index: usize) -> Option<&mut MessagePart> {
        let item = self
            .items
            .entry(output_index)
            .or_insert_with(|| OutputItem::assistant_text(""));
        let OutputItem::Message { content, .. } = item else {
            tracing::debug!(output_index, "Text delta for a non-message output item");
            return None;
        };
        if content.len() <= content_index {
            content.resize_with(content_index + 1, || MessagePart::OutputText {
                text: String::new(),
                annotations: Vec::new(),
            });
        }
        content.get_mut(content_index)
    }

    fn push_reasoning(&mut self, output_index: usize, part_index: usize, delta: &str, summary: bool) {
        let item = self
            .items
            .entry(output_index)
            .or_insert_with(|| OutputItem::Reasoning {
                id: None,
                summary: Vec::new(),
                content: Vec::new(),
                encrypted_content: None,
            });
        let OutputItem::Reasoning {
            summary: summary_parts,
            content,
            ..
        } = item
        else {
            return;
        };
        let parts = if summary { summary_parts } else { content };
        if parts.len() <= part_index {
            parts.resize_with(part_index + 1, || {
                if summary {
                    ReasoningPart::SummaryText {
                        text: String::new(),
                    }
                } else {
                    ReasoningPart::ReasoningText {
                        text: String::new(),
                    }
                }
            });
        }
        if let Some(ReasoningPart::SummaryText { text } | ReasoningPart::ReasoningText { text }) =
            parts.get_mut(part_index)
        {
            text.push_str(delta);
        }
    }

    /// Output items in index order.
    #[must_use]
    pub fn finalize(self) -> Vec<OutputItem> {
        self.items
            .into_values()
            .filter(|item| !matches!(item, OutputItem::Unknown))
            .collect()
    }
}
