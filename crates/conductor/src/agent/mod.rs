//! The agent loop (C6): prompt/continue/steer/follow-up/abort over a
//! committed message list, driven by the streaming provider adapter and
//! the tool executor, optionally durable via a session event log.

pub mod config;
mod events;
mod loop_;
mod queues;

pub use config::{
    resolve_thinking_params, AgentConfig, AgentConfigBuilder, ApiKeyResolver, ContextTransformHook,
    ModelDescriptor, ThinkingBudgetTable, ThinkingLevel, ThinkingParams, ThinkingStyle,
};
pub use events::AgentLoopEvent;
pub use loop_::Agent;
pub use queues::DispatchMode;

pub use crate::error::AgentError;
