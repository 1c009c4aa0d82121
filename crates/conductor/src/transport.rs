//! The provider transport interface consumed from an external HTTP client:
//! something that can open a server-sent-event connection for a prepared
//! request and yield [`crate::adapter::RawProviderEvent`]s. The adapter
//! itself is provider-agnostic; a concrete transport translates one
//! provider's wire framing into this abstract grammar.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::watch;

use conductor_llm::Message;

use crate::adapter::RawProviderEvent;
use crate::agent::config::{ModelDescriptor, ThinkingParams};
use crate::tools::ToolDefinition;

/// Everything a transport needs to open one turn's stream. Built by the
/// loop from the transformed message list plus the active configuration.
pub struct TurnRequest {
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub model: ModelDescriptor,
    pub thinking: ThinkingParams,
    pub api_key: Option<String>,
    /// How many messages, counting from the tail of `messages`, should carry
    /// a provider cache-control marker — resolved from the configured
    /// `CacheRetention` tier by `transform::transform` (§4.2's "applies a
    /// cache-control marker to the last message per a configurable retention
    /// policy"). `0` means no marker at all. A concrete transport encodes
    /// this however its wire format expresses a cache breakpoint.
    pub cache_breakpoints: usize,
}

pub type RawEventStream = Pin<Box<dyn Stream<Item = RawProviderEvent> + Send>>;

/// Opens one streaming turn against a concrete provider. Implementations
/// are expected to translate `cancel` into aborting their own underlying
/// transport (closing the socket, cancelling the HTTP request) in addition
/// to the adapter's own cancellation handling of the yielded stream.
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    async fn open_stream(&self, request: TurnRequest, cancel: watch::Receiver<bool>) -> RawEventStream;
}
