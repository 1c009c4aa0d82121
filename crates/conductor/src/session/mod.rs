//! The append-only session event log (C5).
//!
//! Keyed by session id: `append` assigns the next ordinal for that session
//! and durably records the event; `replay` returns events in ordinal
//! order; `reconstruct` folds them back into the committed message list
//! the agent loop produced. Durability itself is delegated to whatever
//! [`SessionStore`] implementation backs a given loop invocation — the
//! sqlite-backed one in this crate, or another store entirely.

mod error;
mod sqlite;

pub use error::SessionError;
pub use sqlite::SqliteSessionStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use conductor_llm::{Message, ToolResultMessage};

/// Tags the shape of a persisted event's JSON payload. Exactly the tags of
/// the agent loop's emitted event set — see [`crate::agent::AgentLoopEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentStart,
    TurnStart,
    MessageStart,
    MessageUpdate,
    MessageEnd,
    ToolExecutionStart,
    ToolExecutionUpdate,
    ToolExecutionEnd,
    RateLimited,
    TurnEnd,
    AgentEnd,
}

/// One immutable record in the log: `{ session id, ordinal, kind, JSON
/// payload, wall-clock timestamp }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: String,
    pub ordinal: u64,
    pub kind: EventKind,
    pub payload: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// A row of a sessions listing: enough to render a session list
/// without replaying every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub first_user_message: Option<String>,
    pub status: String,
    pub event_count: u64,
    pub completed_at: Option<OffsetDateTime>,
}

/// The persistence interface consumed from an external store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Assigns the next ordinal for `session_id` and durably records the
    /// triple. Appends for distinct sessions are independent; appends
    /// within one session are serialized by the implementation.
    async fn append_event(
        &self,
        session_id: &str,
        kind: EventKind,
        payload: Value,
    ) -> Result<u64, SessionError>;

    /// Events in ordinal order for `session_id`.
    async fn list_events(&self, session_id: &str) -> Result<Vec<SessionEvent>, SessionError>;

    /// Most recently active sessions first, bounded by `limit`.
    async fn sessions_summary(&self, limit: usize) -> Result<Vec<SessionSummary>, SessionError>;

    /// Fold a session's events back into its committed message list. The
    /// default implementation is the event-folding reconstruction and needs no
    /// store-specific knowledge, so implementers get it for free on top of
    /// `list_events`.
    async fn reconstruct(&self, session_id: &str) -> Result<Vec<Message>, SessionError> {
        let events = self.list_events(session_id).await?;
        Ok(reconstruct_from_events(&events))
    }
}

/// Fold an ordinal-ordered event slice into a message list: each
/// `MessageEnd` contributes exactly one message, in emission order; each
/// `ToolExecutionEnd` contributes a tool-result message immediately after
/// its triggering assistant message (which, by construction, is already
/// the most recently folded message at that point). Every other kind is
/// not materialized as a message.
pub fn reconstruct_from_events(events: &[SessionEvent]) -> Vec<Message> {
    let mut messages = Vec::new();
    for event in events {
        match event.kind {
            EventKind::MessageEnd => {
                if let Ok(message) = serde_json::from_value::<Message>(event.payload.clone()) {
                    messages.push(message);
                }
            }
            EventKind::ToolExecutionEnd => {
                if let Ok(result) =
                    serde_json::from_value::<ToolResultMessage>(event.payload.clone())
                {
                    messages.push(Message::ToolResult(result));
                }
            }
            _ => {}
        }
    }
    messages
}
