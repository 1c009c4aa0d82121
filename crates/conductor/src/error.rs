use thiserror::Error;

/// Loop-level errors returned directly to the caller. Tool failures are
/// never surfaced this way — they become `ToolResultMessage`s instead, so
/// a turn can keep running after one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AgentError {
    /// A second `prompt()` call arrived while a turn was already streaming.
    #[error("agent is busy: a prompt is already in progress")]
    Busy,

    /// `continue()` called with no prior messages, or with an assistant
    /// tail and both the steering and follow-up queues empty.
    #[error("cannot continue: {0}")]
    Precondition(String),

    /// The committed message list ended in a state the loop cannot resume
    /// from (e.g. `continue()` expects a non-assistant tail).
    #[error("invalid conversation state: {0}")]
    InvalidState(String),
}
