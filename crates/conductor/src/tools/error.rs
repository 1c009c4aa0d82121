use thiserror::Error;

/// Why a tool call produced an error `ToolResultMessage` instead of a
/// successful one. Never propagated as a loop-level [`crate::AgentError`] —
/// a tool failing is an ordinary, recoverable outcome for the turn.
#[derive(Debug, Error, Clone)]
pub enum ToolError {
    #[error("no tool registered with name {0:?}")]
    NotFound(String),

    #[error("invalid arguments for tool {tool:?}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("tool {tool:?} failed: {message}")]
    ExecutionFailed { tool: String, message: String },

    #[error("tool call was cancelled")]
    Cancelled,
}
