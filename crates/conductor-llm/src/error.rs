use thiserror::Error;

/// Errors surfaced while decoding a provider stream or normalizing a
/// conversation for a provider request.
#[derive(Debug, Error, Clone)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("decoding error: {0}")]
    Decoding(String),

    #[error("unknown stop reason from provider: {0}")]
    UnknownStopReason(String),

    #[error("request was cancelled")]
    Aborted,
}
