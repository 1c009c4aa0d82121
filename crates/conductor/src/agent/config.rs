//! The configuration bundle an agent loop invocation is built from.
//!
//! Modeled on an `agent_config.rs` / `builder.rs` pair: a method-chained builder that
//! assembles model descriptor, tool list, thinking level and retry caps
//! into one immutable value the loop reads from, rather than threading a
//! dozen loose parameters through every transition function.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use conductor_llm::ModelPricing;

use super::queues::DispatchMode;
use crate::tools::ToolRegistry;
use crate::transform::CacheRetention;

/// How a model's reasoning depth is controlled on the wire — the two
/// families a thinking-capable model may belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkingStyle {
    /// The level maps to a provider *effort* parameter.
    Adaptive,
    /// The level maps to `max_tokens` / `thinking_budget_tokens`.
    FixedBudget,
}

/// Static facts about the model a turn is sent to — everything the
/// transform, adapter and thinking-level mapping need that isn't part of
/// the conversation itself.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub id: String,
    pub provider: String,
    pub api_flavor: String,
    pub max_tokens: u64,
    pub supports_vision: bool,
    pub thinking_style: ThinkingStyle,
    pub is_canonical_endpoint: bool,
    pub pricing: Option<ModelPricing>,
}

/// Requested reasoning depth for a turn. `Off` disables provider-side
/// reasoning entirely regardless of `thinking_style`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThinkingLevel {
    Off,
    Minimal,
    Low,
    Medium,
    High,
    XHigh,
}

/// Caller-supplied level → token-budget table for fixed-budget models,
/// overriding the defaults derived from the model's `max_tokens`.
pub type ThinkingBudgetTable = HashMap<ThinkingLevel, u64>;

/// The resolved, wire-ready reasoning parameters for one turn.
#[derive(Debug, Clone, Default)]
pub struct ThinkingParams {
    /// Set only for `Adaptive` models and a non-`Off` level.
    pub effort: Option<&'static str>,
    /// Set only for `FixedBudget` models and a non-`Off` level.
    pub max_tokens: Option<u64>,
    pub thinking_budget_tokens: Option<u64>,
}

/// Map a thinking level onto the wire parameters a turn actually sends,
/// per the two mapping strategies above.
pub fn resolve_thinking_params(
    level: ThinkingLevel,
    model: &ModelDescriptor,
    budgets: Option<&ThinkingBudgetTable>,
) -> ThinkingParams {
    if level == ThinkingLevel::Off {
        return ThinkingParams::default();
    }

    match model.thinking_style {
        ThinkingStyle::Adaptive => ThinkingParams {
            effort: Some(match level {
                ThinkingLevel::XHigh => "max",
                ThinkingLevel::High => "high",
                ThinkingLevel::Medium => "medium",
                ThinkingLevel::Minimal | ThinkingLevel::Low => "low",
                ThinkingLevel::Off => unreachable!("handled above"),
            }),
            max_tokens: None,
            thinking_budget_tokens: None,
        },
        ThinkingStyle::FixedBudget => {
            let budget = budgets
                .and_then(|table| table.get(&level).copied())
                .unwrap_or_else(|| default_budget(level, model.max_tokens));
            ThinkingParams {
                effort: None,
                max_tokens: Some(model.max_tokens),
                thinking_budget_tokens: Some(budget),
            }
        }
    }
}

/// Defaults derived from the model's maximum token budget when the caller
/// supplies no explicit per-level table — a simple fixed fraction per
/// level, growing with requested depth.
fn default_budget(level: ThinkingLevel, max_tokens: u64) -> u64 {
    let fraction = match level {
        ThinkingLevel::Off => return 0,
        ThinkingLevel::Minimal => 0.05,
        ThinkingLevel::Low => 0.1,
        ThinkingLevel::Medium => 0.25,
        ThinkingLevel::High => 0.5,
        ThinkingLevel::XHigh => 0.8,
    };
    ((max_tokens as f64) * fraction) as u64
}

/// Resolves an API key for a provider at request time, so a key never has
/// to be baked into a long-lived `AgentConfig`.
pub trait ApiKeyResolver: Send + Sync {
    fn resolve(&self, provider: &str) -> Option<String>;
}

/// A pre-flight hook that may add or drop messages before a turn is sent,
/// in addition to the standard `transform::transform` pipeline — e.g. to
/// inject retrieved context. Must preserve the turn-role invariant (messages
/// still alternate user/assistant/tool-result correctly).
#[async_trait::async_trait]
pub trait ContextTransformHook: Send + Sync {
    async fn transform(
        &self,
        messages: Vec<conductor_llm::Message>,
        cancel: tokio::sync::watch::Receiver<bool>,
    ) -> Vec<conductor_llm::Message>;
}

/// The full configuration bundle read by one agent loop invocation.
/// Built via [`AgentConfigBuilder`], not constructed directly.
#[derive(Clone)]
pub struct AgentConfig {
    pub system_prompt: Option<String>,
    pub model: ModelDescriptor,
    pub thinking_level: ThinkingLevel,
    pub tools: Arc<ToolRegistry>,
    pub context_transform: Option<Arc<dyn ContextTransformHook>>,
    pub session_id: Option<String>,
    pub api_key_resolver: Option<Arc<dyn ApiKeyResolver>>,
    pub thinking_budgets: Option<Arc<ThinkingBudgetTable>>,
    pub retry_delay_cap: Option<Duration>,
    pub cache_retention: CacheRetention,
    pub steering_mode: DispatchMode,
    pub follow_up_mode: DispatchMode,
}

impl AgentConfig {
    pub fn builder(model: ModelDescriptor) -> AgentConfigBuilder {
        AgentConfigBuilder::new(model)
    }
}

/// Method-chained assembly of an [`AgentConfig`]. `build()` fills every field not explicitly set with a sane
/// default rather than requiring the caller to specify all of them.
pub struct AgentConfigBuilder {
    system_prompt: Option<String>,
    model: ModelDescriptor,
    thinking_level: ThinkingLevel,
    tools: ToolRegistry,
    context_transform: Option<Arc<dyn ContextTransformHook>>,
    session_id: Option<String>,
    api_key_resolver: Option<Arc<dyn ApiKeyResolver>>,
    thinking_budgets: Option<ThinkingBudgetTable>,
    retry_delay_cap: Option<Duration>,
    cache_retention: CacheRetention,
    steering_mode: DispatchMode,
    follow_up_mode: DispatchMode,
}

impl AgentConfigBuilder {
    pub fn new(model: ModelDescriptor) -> Self {
        Self {
            system_prompt: None,
            model,
            thinking_level: ThinkingLevel::Off,
            tools: ToolRegistry::new(),
            context_transform: None,
            session_id: None,
            api_key_resolver: None,
            thinking_budgets: None,
            retry_delay_cap: None,
            cache_retention: CacheRetention::None,
            steering_mode: DispatchMode::All,
            follow_up_mode: DispatchMode::OneAtATime,
        }
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn thinking_level(mut self, level: ThinkingLevel) -> Self {
        self.thinking_level = level;
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn context_transform(mut self, hook: Arc<dyn ContextTransformHook>) -> Self {
        self.context_transform = Some(hook);
        self
    }

    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Mint a fresh session id for this config rather than supplying one by
    /// hand. Uses a v7 UUID (timestamp-ordered), the same id scheme the
    /// provider crates use for session and message ids.
    pub fn generated_session_id(mut self) -> Self {
        self.session_id = Some(uuid::Uuid::now_v7().to_string());
        self
    }

    pub fn api_key_resolver(mut self, resolver: Arc<dyn ApiKeyResolver>) -> Self {
        self.api_key_resolver = Some(resolver);
        self
    }

    pub fn thinking_budgets(mut self, table: ThinkingBudgetTable) -> Self {
        self.thinking_budgets = Some(table);
        self
    }

    pub fn retry_delay_cap(mut self, cap: Duration) -> Self {
        self.retry_delay_cap = Some(cap);
        self
    }

    pub fn cache_retention(mut self, retention: CacheRetention) -> Self {
        self.cache_retention = retention;
        self
    }

    pub fn steering_mode(mut self, mode: DispatchMode) -> Self {
        self.steering_mode = mode;
        self
    }

    pub fn follow_up_mode(mut self, mode: DispatchMode) -> Self {
        self.follow_up_mode = mode;
        self
    }

    pub fn build(self) -> AgentConfig {
        AgentConfig {
            system_prompt: self.system_prompt,
            model: self.model,
            thinking_level: self.thinking_level,
            tools: Arc::new(self.tools),
            context_transform: self.context_transform,
            session_id: self.session_id,
            api_key_resolver: self.api_key_resolver,
            thinking_budgets: self.thinking_budgets.map(Arc::new),
            retry_delay_cap: self.retry_delay_cap,
            cache_retention: self.cache_retention,
            steering_mode: self.steering_mode,
            follow_up_mode: self.follow_up_mode,
        }
    }
}
