//! The provider-agnostic raw event grammar a streaming chat completion is
//! normalized from.
//!
//! Concrete providers speak wildly different wire formats (SSE frames with
//! named events, newline-delimited JSON, websocket frames), but they all
//! reduce to the same handful of structural moments: a message starts, one
//! or more content blocks open and stream deltas and close, usage and a
//! stop reason arrive, the message ends. A provider-specific client is
//! responsible for translating its own framing into this enum; everything
//! downstream of that translation is provider-agnostic.

use conductor_llm::UsageDelta;

/// A block-opening event's payload.
#[derive(Debug, Clone)]
pub enum BlockStart {
    Text,
    Thinking,
    ToolCall { id: String, name: String },
}

/// An incremental update to an already-open block.
#[derive(Debug, Clone)]
pub enum BlockDelta {
    Text(String),
    Thinking(String),
    /// Appends to the signature buffer of whichever block is open at this
    /// index (thinking blocks are signed; text blocks may be too, e.g. when
    /// a provider signs a redacted-thinking-turned-text block).
    Signature(String),
    /// A fragment of a tool call's JSON arguments, to be appended to the
    /// accumulated buffer for this block and re-parsed tolerantly.
    ToolCallArguments(String),
}

#[derive(Debug, Clone)]
pub enum RawProviderEvent {
    MessageStart,
    ContentBlockStart { index: usize, block: BlockStart },
    ContentBlockDelta { index: usize, delta: BlockDelta },
    ContentBlockStop { index: usize },
    /// Usage and/or the provider's raw stop-reason string, as they trickle
    /// in ahead of the terminal `MessageStop`. A provider may send this
    /// more than once; each occurrence carries the absolute usage snapshot
    /// known so far, not a further delta on top of the last one sent here.
    MessageDelta {
        usage: Option<UsageDelta>,
        stop_reason: Option<String>,
    },
    MessageStop,
    /// The provider's transport itself failed (connection reset, non-2xx
    /// response, malformed frame) — distinct from a stop reason the
    /// provider chose deliberately.
    TransportError(String),
}
