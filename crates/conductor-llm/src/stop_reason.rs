use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Terminal reason an assistant turn stopped, normalized across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Stop,
    Length,
    ToolUse,
    Error,
    Aborted,
}

/// Translate a provider-native stop/finish-reason string into a
/// [`StopReason`]. The table is fixed; an unrecognized string is a fatal
/// decoding error rather than silently falling back to `Other`, per the
/// adapter's decoding rules.
pub fn translate_stop_reason(raw: &str) -> Result<StopReason, LlmError> {
    match raw {
        "end_turn" | "stop" | "stop_sequence" => Ok(StopReason::Stop),
        "max_tokens" | "length" => Ok(StopReason::Length),
        "tool_use" | "tool_calls" => Ok(StopReason::ToolUse),
        "refusal" | "sensitive" | "content_filter" | "error" => Ok(StopReason::Error),
        "pause_turn" => Ok(StopReason::Stop),
        "aborted" | "cancelled" => Ok(StopReason::Aborted),
        other => Err(LlmError::UnknownStopReason(other.to_string())),
    }
}
