//! Decodes a [`RawProviderEvent`] stream into the normalized
//! `start → {block}_start/delta/end → done/error` event sequence, building
//! up an [`AssistantMessage`] incrementally as it goes.

use std::collections::HashMap;
use std::sync::Arc;

use conductor_llm::{
    translate_stop_reason, AssistantMessage, ContentBlock, ModelPricing, StopReason, Usage,
};
use futures::{Stream, StreamExt};
use tokio::sync::watch;

use crate::event_stream::{event_stream, EventStream};
use crate::tolerant_json::tolerant_parse;

use super::raw::{BlockDelta, BlockStart, RawProviderEvent};

/// One entry per open content block, tracked in the same order as
/// `partial.content` so an index from the raw stream maps straight to a
/// `Vec` position.
#[derive(Clone, Copy, PartialEq, Eq)]
enum OpenKind {
    Text,
    Thinking,
    ToolCall,
}

/// A normalized, provider-agnostic event describing one step of an
/// assistant turn's incremental construction.
#[derive(Debug, Clone)]
pub enum NormalizedEvent {
    Start,
    TextStart {
        index: usize,
    },
    TextDelta {
        index: usize,
        delta: String,
        partial: AssistantMessage,
    },
    TextEnd {
        index: usize,
    },
    ThinkingStart {
        index: usize,
    },
    ThinkingDelta {
        index: usize,
        delta: String,
        partial: AssistantMessage,
    },
    ThinkingSignatureDelta {
        index: usize,
        delta: String,
        partial: AssistantMessage,
    },
    ThinkingEnd {
        index: usize,
    },
    ToolCallStart {
        index: usize,
        id: String,
        name: String,
    },
    ToolCallArgumentsDelta {
        index: usize,
        delta: String,
        partial: AssistantMessage,
    },
    ToolCallEnd {
        index: usize,
        partial: AssistantMessage,
    },
    Usage {
        partial: AssistantMessage,
    },
    Done {
        stop_reason: StopReason,
        partial: AssistantMessage,
    },
    /// A terminal error: either the transport failed, the provider's stop
    /// reason was unrecognized, or the turn was cancelled. Any content
    /// blocks still open at this point are implicitly closed — no further
    /// `*_end` event follows.
    Error {
        stop_reason: StopReason,
        message: String,
        partial: AssistantMessage,
    },
}

/// Decode `raw` into a normalized event stream, consuming it on a spawned
/// task. `cancel` going true at any point stops reading from `raw` and
/// emits a single terminal `Error { stop_reason: Aborted, .. }`.
pub fn decode_stream<S>(
    raw: S,
    mut cancel: watch::Receiver<bool>,
    model: String,
    provider: String,
    api_flavor: String,
    pricing: Option<ModelPricing>,
) -> EventStream<NormalizedEvent>
where
    S: Stream<Item = RawProviderEvent> + Unpin + Send + 'static,
{
    let (producer, stream) = event_stream::<NormalizedEvent>();

    tokio::spawn(async move {
        let mut raw = raw;
        let mut partial = AssistantMessage {
            content: Vec::new(),
            model,
            provider,
            api_flavor,
            usage: Usage::default(),
            stop_reason: StopReason::Stop,
            error_message: None,
            created_at: partial_created_at(),
        };
        let mut kinds: Vec<OpenKind> = Vec::new();
        let mut tool_scratch: HashMap<usize, String> = HashMap::new();
        let mut pending_stop_reason: Option<String> = None;

        producer.push(NormalizedEvent::Start);

        loop {
            if *cancel.borrow() {
                finish_aborted(&producer, &mut partial);
                return;
            }

            let next = tokio::select! {
                biased;
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        finish_aborted(&producer, &mut partial);
                        return;
                    }
                    continue;
                }
                item = raw.next() => item,
            };

            let Some(event) = next else {
                // The stream ended without a `MessageStop` — treat it as a
                // transport failure rather than silently truncating.
                finish_error(
                    &producer,
                    &mut partial,
                    StopReason::Error,
                    "provider stream ended before message_stop".to_string(),
                );
                return;
            };

            match event {
                RawProviderEvent::MessageStart => {}

                RawProviderEvent::ContentBlockStart { index, block } => {
                    debug_assert_eq!(index, partial.content.len());
                    match block {
                        BlockStart::Text => {
                            partial.content.push(ContentBlock::Text {
                                text: String::new(),
                                signature: None,
                            });
                            kinds.push(OpenKind::Text);
                            producer.push(NormalizedEvent::TextStart { index });
                        }
                        BlockStart::Thinking => {
                            partial.content.push(ContentBlock::Thinking {
                                thinking: String::new(),
                                signature: None,
                            });
                            kinds.push(OpenKind::Thinking);
                            producer.push(NormalizedEvent::ThinkingStart { index });
                        }
                        BlockStart::ToolCall { id, name } => {
                            partial.content.push(ContentBlock::ToolCall {
                                id: id.clone(),
                                name: name.clone(),
                                arguments: serde_json::json!({}),
                                thought_signature: None,
                            });
                            kinds.push(OpenKind::ToolCall);
                            tool_scratch.insert(index, String::new());
                            producer.push(NormalizedEvent::ToolCallStart { index, id, name });
                        }
                    }
                }

                RawProviderEvent::ContentBlockDelta { index, delta } => {
                    apply_block_delta(&mut partial, &mut tool_scratch, index, delta, &producer);
                }

                RawProviderEvent::ContentBlockStop { index } => match kinds.get(index) {
                    Some(OpenKind::Text) => producer.push(NormalizedEvent::TextEnd { index }),
                    Some(OpenKind::Thinking) => {
                        producer.push(NormalizedEvent::ThinkingEnd { index })
                    }
                    Some(OpenKind::ToolCall) => {
                        tool_scratch.remove(&index);
                        producer.push(NormalizedEvent::ToolCallEnd {
                            index,
                            partial: partial.clone(),
                        })
                    }
                    None => {}
                },

                RawProviderEvent::MessageDelta { usage, stop_reason } => {
                    if let Some(delta) = usage {
                        partial.usage.merge_delta(delta, pricing.as_ref());
                        producer.push(NormalizedEvent::Usage {
                            partial: partial.clone(),
                        });
                    }
                    if let Some(reason) = stop_reason {
                        pending_stop_reason = Some(reason);
                    }
                }

                RawProviderEvent::MessageStop => {
                    let Some(raw_reason) = pending_stop_reason.take() else {
                        finish_error(
                            &producer,
                            &mut partial,
                            StopReason::Error,
                            "message_stop arrived with no stop reason".to_string(),
                        );
                        return;
                    };
                    match translate_stop_reason(&raw_reason) {
                        Ok(reason) => {
                            partial.stop_reason = reason;
                            producer.push(NormalizedEvent::Done {
                                stop_reason: reason,
                                partial: partial.clone(),
                            });
                        }
                        Err(err) => {
                            finish_error(&producer, &mut partial, StopReason::Error, err.to_string());
                        }
                    }
                    producer.end();
                    return;
                }

                RawProviderEvent::TransportError(message) => {
                    finish_error(&producer, &mut partial, StopReason::Error, message);
                    return;
                }
            }
        }
    });

    stream
}

fn apply_block_delta(
    partial: &mut AssistantMessage,
    tool_scratch: &mut HashMap<usize, String>,
    index: usize,
    delta: BlockDelta,
    producer: &Arc<crate::event_stream::EventStreamProducer<NormalizedEvent>>,
) {
    let Some(block) = partial.content.get_mut(index) else {
        return;
    };
    match (block, delta) {
        (ContentBlock::Text { text, .. }, BlockDelta::Text(fragment)) => {
            text.push_str(&fragment);
            producer.push(NormalizedEvent::TextDelta {
                index,
                delta: fragment,
                partial: partial.clone(),
            });
        }
        (ContentBlock::Thinking { thinking, .. }, BlockDelta::Thinking(fragment)) => {
            thinking.push_str(&fragment);
            producer.push(NormalizedEvent::ThinkingDelta {
                index,
                delta: fragment,
                partial: partial.clone(),
            });
        }
        (ContentBlock::Text { signature, .. }, BlockDelta::Signature(fragment))
        | (ContentBlock::Thinking { signature, .. }, BlockDelta::Signature(fragment)) => {
            signature.get_or_insert_with(String::new).push_str(&fragment);
            producer.push(NormalizedEvent::ThinkingSignatureDelta {
                index,
                delta: fragment,
                partial: partial.clone(),
            });
        }
        (ContentBlock::ToolCall { arguments, .. }, BlockDelta::ToolCallArguments(fragment)) => {
            let buf = tool_scratch.entry(index).or_default();
            buf.push_str(&fragment);
            *arguments = tolerant_parse(buf);
            producer.push(NormalizedEvent::ToolCallArgumentsDelta {
                index,
                delta: fragment,
                partial: partial.clone(),
            });
        }
        _ => {
            // Mismatched delta kind for the block open at this index.
            // Providers don't do this; silently ignore rather than panic.
        }
    }
}

fn finish_aborted(
    producer: &Arc<crate::event_stream::EventStreamProducer<NormalizedEvent>>,
    partial: &mut AssistantMessage,
) {
    finish_error(
        producer,
        partial,
        StopReason::Aborted,
        "turn was cancelled".to_string(),
    );
}

fn finish_error(
    producer: &Arc<crate::event_stream::EventStreamProducer<NormalizedEvent>>,
    partial: &mut AssistantMessage,
    stop_reason: StopReason,
    message: String,
) {
    partial.stop_reason = stop_reason;
    partial.error_message = Some(message.clone());
    producer.push(NormalizedEvent::Error {
        stop_reason,
        message,
        partial: partial.clone(),
    });
    producer.end();
}

fn partial_created_at() -> time::OffsetDateTime {
    // Stamped once when the assistant message starts streaming; this is
    // the one place in the crate allowed to call out to wall-clock time
    // directly rather than threading it through as an argument, since a
    // turn's start time is inherently "now, from the decoder's point of
    // view" and not meaningfully injectable by a caller.
    time::OffsetDateTime::now_utc()
}
