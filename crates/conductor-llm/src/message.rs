use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::stop_reason::StopReason;
use crate::usage::Usage;

/// A single piece of assistant or user content.
///
/// Signatures on `Thinking` and `Text` blocks are opaque provider tokens that
/// must be echoed back verbatim on the next turn to preserve reasoning
/// continuity; the runtime never inspects their contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    Thinking {
        thinking: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    Image {
        /// base64-encoded image bytes
        data: String,
        mime_type: String,
    },
    ToolCall {
        /// Provider-issued id, unique within the assistant message that
        /// carries it. Normalized to `[A-Za-z0-9_-]{1,64}` before being
        /// echoed back to the provider (see `transform::normalize_tool_call_id`).
        id: String,
        name: String,
        arguments: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        thought_signature: Option<String>,
    },
}

impl ContentBlock {
    pub fn is_empty(&self) -> bool {
        match self {
            ContentBlock::Text { text, .. } => text.trim().is_empty(),
            ContentBlock::Thinking { thinking, .. } => thinking.trim().is_empty(),
            ContentBlock::Image { .. } => false,
            ContentBlock::ToolCall { .. } => false,
        }
    }

    /// Demote a thinking block with no (or empty) signature to a plain text
    /// block, per the rule that unsigned reasoning cannot be echoed back to
    /// the provider as `Thinking` on the next turn.
    pub fn demote_unsigned_thinking(self) -> ContentBlock {
        match self {
            ContentBlock::Thinking {
                thinking,
                signature,
            } if signature.as_deref().unwrap_or("").is_empty() => ContentBlock::Text {
                text: thinking,
                signature: None,
            },
            other => other,
        }
    }
}

/// Either a bare string or an ordered sequence of blocks — the two shapes a
/// user message's content may take on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl UserContent {
    pub fn is_empty(&self) -> bool {
        match self {
            UserContent::Text(s) => s.is_empty(),
            UserContent::Blocks(blocks) => blocks.is_empty() || blocks.iter().all(|b| b.is_empty()),
        }
    }

    pub fn into_blocks(self) -> Vec<ContentBlock> {
        match self {
            UserContent::Text(text) => vec![ContentBlock::Text {
                text,
                signature: None,
            }],
            UserContent::Blocks(blocks) => blocks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: UserContent,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub content: Vec<ContentBlock>,
    pub model: String,
    pub provider: String,
    /// The provider's wire dialect, e.g. "messages" vs "responses" — kept
    /// opaque here; only the adapter interprets it.
    pub api_flavor: String,
    pub usage: Usage,
    pub stop_reason: StopReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl AssistantMessage {
    /// An assistant message carries real content once at least one block
    /// survives trimming of empty text/thinking blocks.
    pub fn has_content(&self) -> bool {
        self.content.iter().any(|b| !b.is_empty())
    }

    /// Build the degenerate message appended when a turn ends in error or
    /// abort and no usable partial content was produced.
    pub fn degenerate(
        model: String,
        provider: String,
        api_flavor: String,
        stop_reason: StopReason,
        error_message: String,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            content: Vec::new(),
            model,
            provider,
            api_flavor,
            usage: Usage::default(),
            stop_reason,
            error_message: Some(error_message),
            created_at,
        }
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        self.content.iter().filter_map(|b| match b {
            ContentBlock::ToolCall {
                id,
                name,
                arguments,
                ..
            } => Some((id.as_str(), name.as_str(), arguments)),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultMessage {
    pub tool_call_id: String,
    pub tool_name: String,
    pub content: Vec<ContentBlock>,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ToolResultMessage {
    /// A tool with no result content still produces one empty text block,
    /// never zero blocks — callers should route synthesized results through
    /// here rather than constructing `content: vec![]` directly.
    pub fn new(
        tool_call_id: String,
        tool_name: String,
        mut content: Vec<ContentBlock>,
        is_error: bool,
        details: Option<Value>,
        created_at: OffsetDateTime,
    ) -> Self {
        if content.is_empty() {
            content.push(ContentBlock::Text {
                text: String::new(),
                signature: None,
            });
        }
        Self {
            tool_call_id,
            tool_name,
            content,
            is_error,
            details,
            created_at,
        }
    }
}

/// A single entry in the conversation, tagged by role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
    ToolResult(ToolResultMessage),
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Message::User(UserMessage {
            content: UserContent::Text(text.into()),
            created_at: OffsetDateTime::now_utc(),
        })
    }

    pub fn created_at(&self) -> OffsetDateTime {
        match self {
            Message::User(m) => m.created_at,
            Message::Assistant(m) => m.created_at,
            Message::ToolResult(m) => m.created_at,
        }
    }
}
