use thiserror::Error;

/// Persistence failures. Always non-fatal to the loop —
/// an append failure is logged and swallowed, never surfaced as a turn
/// failure, since losing a durability guarantee is not the same as losing
/// the conversation itself.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store error: {0}")]
    Storage(String),

    #[error("session {0:?} not found")]
    NotFound(String),
}
