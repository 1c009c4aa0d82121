//! The higher-level event set the agent loop emits to callers,
//! additionally appended to the session event log when a session id is
//! attached (with the noted exception of `ToolExecutionUpdate`, per the
//! open design question below).

use conductor_llm::{AssistantMessage, Message, ToolResultMessage};
use serde_json::Value;

use crate::adapter::NormalizedEvent;
use crate::session::EventKind;

/// One event on the loop's own output stream (distinct from, but driven
/// by, the adapter's [`NormalizedEvent`]s during `STREAMING`).
#[derive(Debug, Clone)]
pub enum AgentLoopEvent {
    AgentStart,
    TurnStart,
    /// A new message is being appended — user, assistant, or (logically)
    /// a tool-result, though tool-result lifecycle is also separately
    /// reported via the `ToolExecution*` variants.
    MessageStart { role: &'static str },
    /// One incremental update to the in-progress assistant message, as
    /// decoded by the adapter.
    MessageUpdate(NormalizedEvent),
    MessageEnd { message: Message },
    ToolExecutionStart { tool_call_id: String, name: String },
    ToolExecutionUpdate { tool_call_id: String, payload: Value },
    ToolExecutionEnd { result: ToolResultMessage },
    /// Populated by a transport wrapper that retries provider errors itself
    /// (§1 non-goals: the core does not retry beyond respecting a bounded
    /// delay cap) — the core never constructs this variant, it only shapes
    /// it so a wrapper has somewhere to report a retry-after wait against
    /// `AgentConfig::retry_delay_cap`.
    RateLimited { attempt: u32, delay_ms: u64 },
    TurnEnd,
    AgentEnd,
}

impl AgentLoopEvent {
    /// The session-log kind this event persists as, or `None` for the one
    /// kind that is never durably appended.
    pub fn persisted_kind(&self) -> Option<EventKind> {
        match self {
            AgentLoopEvent::AgentStart => Some(EventKind::AgentStart),
            AgentLoopEvent::TurnStart => Some(EventKind::TurnStart),
            AgentLoopEvent::MessageStart { .. } => Some(EventKind::MessageStart),
            AgentLoopEvent::MessageUpdate(_) => Some(EventKind::MessageUpdate),
            AgentLoopEvent::MessageEnd { .. } => Some(EventKind::MessageEnd),
            AgentLoopEvent::ToolExecutionStart { .. } => Some(EventKind::ToolExecutionStart),
            AgentLoopEvent::ToolExecutionUpdate { .. } => None,
            AgentLoopEvent::ToolExecutionEnd { .. } => Some(EventKind::ToolExecutionEnd),
            AgentLoopEvent::RateLimited { .. } => Some(EventKind::RateLimited),
            AgentLoopEvent::TurnEnd => Some(EventKind::TurnEnd),
            AgentLoopEvent::AgentEnd => Some(EventKind::AgentEnd),
        }
    }

    /// The JSON payload to persist alongside `persisted_kind()`, when one
    /// exists. `MessageUpdate` payloads are intentionally sparse — the
    /// full partial message already reaches callers live; only a
    /// best-effort summary is durable for `MessageUpdate`, since any
    /// individual delta is superseded by the next one within the turn.
    pub fn payload(&self) -> Value {
        match self {
            AgentLoopEvent::AgentStart
            | AgentLoopEvent::TurnStart
            | AgentLoopEvent::TurnEnd
            | AgentLoopEvent::AgentEnd => Value::Null,
            AgentLoopEvent::MessageStart { role } => serde_json::json!({ "role": role }),
            AgentLoopEvent::MessageUpdate(_) => Value::Null,
            AgentLoopEvent::MessageEnd { message } => {
                serde_json::to_value(message).unwrap_or(Value::Null)
            }
            AgentLoopEvent::ToolExecutionStart { tool_call_id, name } => {
                serde_json::json!({ "tool_call_id": tool_call_id, "name": name })
            }
            AgentLoopEvent::ToolExecutionUpdate { tool_call_id, payload } => {
                serde_json::json!({ "tool_call_id": tool_call_id, "payload": payload })
            }
            AgentLoopEvent::ToolExecutionEnd { result } => {
                serde_json::to_value(result).unwrap_or(Value::Null)
            }
            AgentLoopEvent::RateLimited { attempt, delay_ms } => {
                serde_json::json!({ "attempt": attempt, "delay_ms": delay_ms })
            }
        }
    }
}

/// Build the degenerate assistant message's `MessageEnd` payload helper —
/// a thin convenience so loop code doesn't repeat the `AssistantMessage`
/// wrap at every call site.
pub fn assistant_message_end(message: AssistantMessage) -> AgentLoopEvent {
    AgentLoopEvent::MessageEnd {
        message: Message::Assistant(message),
    }
}
