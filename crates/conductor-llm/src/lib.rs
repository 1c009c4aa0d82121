//! Shared message, content-block, usage and pricing types for the conductor
//! agent runtime. Kept dependency-light (no tokio, no async-trait) so that
//! persistence and UI layers can depend on it without pulling in the full
//! runtime.

pub mod error;
pub mod message;
pub mod pricing;
pub mod stop_reason;
pub mod usage;

pub use error::LlmError;
pub use message::{
    AssistantMessage, ContentBlock, Message, ToolResultMessage, UserContent, UserMessage,
};
pub use pricing::ModelPricing;
pub use stop_reason::{translate_stop_reason, StopReason};
pub use usage::{Cost, Usage, UsageDelta};
