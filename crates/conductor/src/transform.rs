//! Pre-flight transformation of a committed message list into the shape a
//! provider request actually sends: consecutive same-role messages merged,
//! empty blocks dropped, unsupported content stripped for the target
//! model's capabilities, tool-call ids normalized, every outbound string
//! sanitized, and cache-control breakpoints applied.
//!
//! Every step here is a pure function of its input — running the whole
//! pipeline twice on its own output must be a no-op, since a retried
//! request re-transforms the same committed history from scratch.

use conductor_llm::{ContentBlock, Message, UserContent, UserMessage};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::sanitize::strip_unpaired_surrogates;

/// How aggressively to mark cache breakpoints on outbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheRetention {
    None,
    Short,
    Long,
}

/// Capabilities of the target model that affect what content survives the
/// transform. Set per-request by whatever looked the model up.
#[derive(Debug, Clone, Copy)]
pub struct ModelCapabilities {
    pub supports_vision: bool,
}

/// Everything the transform needs besides the message list itself.
#[derive(Debug, Clone)]
pub struct TransformContext {
    pub capabilities: ModelCapabilities,
    pub cache_retention: CacheRetention,
    /// True when the request is going straight to the model's own canonical
    /// endpoint rather than a proxy/gateway — `Long` retention downgrades to
    /// `Short` everywhere else, since a long-lived cache breakpoint against
    /// a gateway that doesn't share the provider's cache is wasted.
    pub is_canonical_endpoint: bool,
}

static TOOL_CALL_ID_CHAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").expect("static regex"));

/// Replace every character outside `[A-Za-z0-9_-]` and clamp to 64 chars, so
/// a provider-issued id that contains e.g. a colon or is implausibly long
/// can still be echoed back on the next turn.
pub fn normalize_tool_call_id(id: &str) -> String {
    let cleaned = TOOL_CALL_ID_CHAR.replace_all(id, "_").into_owned();
    let cleaned = if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    };
    cleaned.chars().take(64).collect()
}

fn effective_retention(ctx: &TransformContext) -> CacheRetention {
    match ctx.cache_retention {
        CacheRetention::Long if !ctx.is_canonical_endpoint => CacheRetention::Short,
        other => other,
    }
}

/// The result of running the pre-flight pipeline: the transformed message
/// list plus how many trailing messages should carry a cache-control
/// marker, for [`crate::transport::TurnRequest::cache_breakpoints`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutput {
    pub messages: Vec<Message>,
    pub cache_breakpoints: usize,
}

/// Run the full pre-flight pipeline over a committed message list.
pub fn transform(messages: &[Message], ctx: &TransformContext) -> TransformOutput {
    let sanitized: Vec<Message> = messages.iter().cloned().map(sanitize_message).collect();
    let stripped: Vec<Message> = sanitized
        .into_iter()
        .map(|m| strip_unsupported_content(m, ctx.capabilities))
        .collect();
    let normalized_ids: Vec<Message> = stripped.into_iter().map(normalize_ids_in).collect();
    let trimmed: Vec<Message> = normalized_ids
        .into_iter()
        .filter_map(drop_empty_blocks)
        .collect();
    let merged = merge_consecutive_same_role(trimmed);
    apply_cache_breakpoints(merged, effective_retention(ctx))
}

fn sanitize_message(message: Message) -> Message {
    match message {
        Message::User(mut m) => {
            m.content = match m.content {
                UserContent::Text(t) => UserContent::Text(strip_unpaired_surrogates(&t)),
                UserContent::Blocks(blocks) => {
                    UserContent::Blocks(blocks.into_iter().map(sanitize_block).collect())
                }
            };
            Message::User(m)
        }
        Message::Assistant(mut m) => {
            m.content = m.content.into_iter().map(sanitize_block).collect();
            Message::Assistant(m)
        }
        Message::ToolResult(mut m) => {
            m.content = m.content.into_iter().map(sanitize_block).collect();
            Message::ToolResult(m)
        }
    }
}

fn sanitize_block(block: ContentBlock) -> ContentBlock {
    match block {
        ContentBlock::Text { text, signature } => ContentBlock::Text {
            text: strip_unpaired_surrogates(&text),
            signature,
        },
        ContentBlock::Thinking { thinking, signature } => ContentBlock::Thinking {
            thinking: strip_unpaired_surrogates(&thinking),
            signature,
        },
        other => other,
    }
}

fn strip_unsupported_content(message: Message, caps: ModelCapabilities) -> Message {
    if caps.supports_vision {
        return message;
    }
    match message {
        Message::User(mut m) => {
            if let UserContent::Blocks(blocks) = m.content {
                let kept: Vec<ContentBlock> = blocks
                    .into_iter()
                    .filter(|b| !matches!(b, ContentBlock::Image { .. }))
                    .collect();
                m.content = UserContent::Blocks(kept);
            }
            Message::User(m)
        }
        other => other,
    }
}

fn normalize_ids_in(message: Message) -> Message {
    match message {
        Message::Assistant(mut m) => {
            m.content = m
                .content
                .into_iter()
                .map(|b| match b {
                    ContentBlock::ToolCall {
                        id,
                        name,
                        arguments,
                        thought_signature,
                    } => ContentBlock::ToolCall {
                        id: normalize_tool_call_id(&id),
                        name,
                        arguments,
                        thought_signature,
                    },
                    other => other,
                })
                .collect();
            Message::Assistant(m)
        }
        Message::ToolResult(mut m) => {
            m.tool_call_id = normalize_tool_call_id(&m.tool_call_id);
            Message::ToolResult(m)
        }
        other => other,
    }
}

/// Drop empty text/thinking blocks, demote unsigned thinking to text, and
/// drop a message entirely once that leaves it with no content (except
/// tool results, which always keep their placeholder block).
fn drop_empty_blocks(message: Message) -> Option<Message> {
    match message {
        Message::User(mut m) => {
            if let UserContent::Blocks(blocks) = m.content {
                let kept: Vec<ContentBlock> = blocks.into_iter().filter(|b| !b.is_empty()).collect();
                if kept.is_empty() {
                    return None;
                }
                m.content = UserContent::Blocks(kept);
            } else if m.content.is_empty() {
                return None;
            }
            Some(Message::User(m))
        }
        Message::Assistant(mut m) => {
            m.content = m
                .content
                .into_iter()
                .map(ContentBlock::demote_unsigned_thinking)
                .filter(|b| !b.is_empty())
                .collect();
            if m.content.is_empty() && m.error_message.is_none() {
                return None;
            }
            Some(Message::Assistant(m))
        }
        Message::ToolResult(m) => Some(Message::ToolResult(m)),
    }
}

/// Merge runs of consecutive messages with the same role into one, per the
/// observation that providers reject back-to-back same-role turns (e.g. two
/// tool results belonging to the same assistant turn merge into one user-
/// visible "tool" turn on providers that model it that way).
fn merge_consecutive_same_role(messages: Vec<Message>) -> Vec<Message> {
    let mut out: Vec<Message> = Vec::with_capacity(messages.len());
    for message in messages {
        match (out.last_mut(), &message) {
            (Some(Message::User(prev)), Message::User(next)) => {
                merge_user(prev, next);
            }
            (Some(Message::ToolResult(_)), Message::ToolResult(_)) => {
                out.push(message);
            }
            _ => out.push(message),
        }
    }
    out
}

fn merge_user(prev: &mut UserMessage, next: &UserMessage) {
    let mut blocks = std::mem::replace(&mut prev.content, UserContent::Blocks(Vec::new())).into_blocks();
    blocks.extend(next.content.clone().into_blocks());
    prev.content = UserContent::Blocks(blocks);
}

/// Decide how many trailing messages count as cache boundaries for
/// `retention`, and surface that count on the [`TransformOutput`] rather
/// than mutating message content — the actual provider wire encoding of a
/// cache-control marker happens downstream, in whatever `ProviderTransport`
/// builds the request, via `TurnRequest::cache_breakpoints`.
fn apply_cache_breakpoints(messages: Vec<Message>, retention: CacheRetention) -> TransformOutput {
    let breakpoints = match retention {
        CacheRetention::None => 0,
        CacheRetention::Short => 1,
        CacheRetention::Long => 2,
    };
    let cache_breakpoints = breakpoints.min(messages.len());
    TransformOutput {
        messages,
        cache_breakpoints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_llm::AssistantMessage;
    use conductor_llm::{StopReason, Usage};
    use time::OffsetDateTime;

    fn default_ctx() -> TransformContext {
        TransformContext {
            capabilities: ModelCapabilities { supports_vision: true },
            cache_retention: CacheRetention::None,
            is_canonical_endpoint: true,
        }
    }

    fn user(text: &str) -> Message {
        Message::User(UserMessage {
            content: UserContent::Text(text.to_string()),
            created_at: OffsetDateTime::UNIX_EPOCH,
        })
    }

    fn assistant(text: &str) -> AssistantMessage {
        AssistantMessage {
            content: vec![ContentBlock::Text {
                text: text.to_string(),
                signature: None,
            }],
            model: "m".into(),
            provider: "p".into(),
            api_flavor: "f".into(),
            usage: Usage::default(),
            stop_reason: StopReason::Stop,
            error_message: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn consecutive_user_messages_merge_into_one() {
        let messages = vec![user("hi"), user("there")];
        let out = transform(&messages, &default_ctx());
        assert_eq!(out.messages.len(), 1);
        match &out.messages[0] {
            Message::User(m) => {
                assert_eq!(m.content.clone().into_blocks().len(), 2);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn empty_text_blocks_are_dropped() {
        let mut msg = assistant("");
        msg.content.push(ContentBlock::Text {
            text: "real content".into(),
            signature: None,
        });
        let out = transform(&[Message::Assistant(msg)], &default_ctx());
        assert_eq!(out.messages.len(), 1);
        match &out.messages[0] {
            Message::Assistant(m) => assert_eq!(m.content.len(), 1),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unsigned_thinking_is_demoted_to_text_before_transport() {
        let mut msg = assistant("");
        msg.content = vec![ContentBlock::Thinking {
            thinking: "reasoning".into(),
            signature: None,
        }];
        let out = transform(&[Message::Assistant(msg)], &default_ctx());
        match &out.messages[0] {
            Message::Assistant(m) => match &m.content[0] {
                ContentBlock::Text { text, .. } => assert_eq!(text, "reasoning"),
                other => panic!("unexpected block: {other:?}"),
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn tool_call_ids_are_normalized_to_the_safe_charset() {
        let mut msg = assistant("");
        msg.content = vec![ContentBlock::ToolCall {
            id: "call:weird id!".into(),
            name: "search".into(),
            arguments: serde_json::json!({}),
            thought_signature: None,
        }];
        let out = transform(&[Message::Assistant(msg)], &default_ctx());
        match &out.messages[0] {
            Message::Assistant(m) => match &m.content[0] {
                ContentBlock::ToolCall { id, .. } => {
                    assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
                }
                other => panic!("unexpected block: {other:?}"),
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn images_are_stripped_when_the_model_has_no_vision() {
        let msg = Message::User(UserMessage {
            content: UserContent::Blocks(vec![
                ContentBlock::Text {
                    text: "describe this".into(),
                    signature: None,
                },
                ContentBlock::Image {
                    data: "base64==".into(),
                    mime_type: "image/png".into(),
                },
            ]),
            created_at: OffsetDateTime::UNIX_EPOCH,
        });
        let ctx = TransformContext {
            capabilities: ModelCapabilities { supports_vision: false },
            ..default_ctx()
        };
        let out = transform(&[msg], &ctx);
        match &out.messages[0] {
            Message::User(m) => {
                let blocks = m.content.clone().into_blocks();
                assert_eq!(blocks.len(), 1);
                assert!(matches!(blocks[0], ContentBlock::Text { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn transform_is_idempotent() {
        let messages = vec![user("hi"), user("there"), Message::Assistant(assistant("ok"))];
        let ctx = default_ctx();
        let once = transform(&messages, &ctx);
        let twice = transform(&once.messages, &ctx);
        assert_eq!(once, twice);
    }

    #[test]
    fn cache_retention_resolves_to_the_matching_trailing_breakpoint_count() {
        let messages = vec![user("a"), user("b"), Message::Assistant(assistant("c"))];
        let none = transform(
            &messages,
            &TransformContext {
                cache_retention: CacheRetention::None,
                ..default_ctx()
            },
        );
        assert_eq!(none.cache_breakpoints, 0);

        let short = transform(
            &messages,
            &TransformContext {
                cache_retention: CacheRetention::Short,
                ..default_ctx()
            },
        );
        assert_eq!(short.cache_breakpoints, 1);

        let long = transform(
            &messages,
            &TransformContext {
                cache_retention: CacheRetention::Long,
                ..default_ctx()
            },
        );
        assert_eq!(long.cache_breakpoints, 2);
    }

    #[test]
    fn cache_breakpoints_never_exceed_the_message_count() {
        let messages = vec![user("only one")];
        let out = transform(
            &messages,
            &TransformContext {
                cache_retention: CacheRetention::Long,
                ..default_ctx()
            },
        );
        assert_eq!(out.cache_breakpoints, 1);
    }

    #[test]
    fn long_retention_downgrades_to_short_off_the_canonical_endpoint() {
        let ctx = TransformContext {
            capabilities: ModelCapabilities { supports_vision: true },
            cache_retention: CacheRetention::Long,
            is_canonical_endpoint: false,
        };
        assert_eq!(effective_retention(&ctx), CacheRetention::Short);
    }
}
