//! Name-addressed map of the tools available to a turn.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde_json::Value;

use super::context::ToolContext;
use super::error::ToolError;
use conductor_llm::ContentBlock;

/// Derive a tool's `parameters_schema()` from a `JsonSchema`-deriving
/// arguments struct, mirroring the provider crates' `schemars::schema_for!`
/// usage for their config types. Most `Tool` impls want this rather than
/// hand-writing a `serde_json::json!` schema literal.
pub fn json_schema_for<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema.schema).unwrap_or(Value::Null)
}

/// The result of a successful tool execution, before it is wrapped into a
/// `ToolResultMessage` (which also needs the originating call's id/name).
pub struct ToolOutcome {
    pub content: Vec<ContentBlock>,
    pub is_error: bool,
    pub details: Option<Value>,
}

impl ToolOutcome {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text {
                text: text.into(),
                signature: None,
            }],
            is_error: false,
            details: None,
        }
    }
}

/// A single callable tool. Implementations are expected to be cheap to
/// hold as `Arc<dyn Tool>` and safe to call concurrently for distinct tool
/// calls within the same turn.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    /// Short human-facing label (e.g. for a UI's tool-call chip), distinct
    /// from `name`'s wire identifier and from the longer `description` sent
    /// to the provider.
    fn label(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema describing the tool's argument object, sent to the
    /// provider as part of the tool definition list.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, arguments: Value, cx: &ToolContext) -> Result<ToolOutcome, ToolError>;
}

/// A tool definition as sent to a provider: name, label, description, schema.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub label: String,
    pub description: String,
    pub parameters_schema: Value,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.remove(name)
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                label: t.label().to_string(),
                description: t.description().to_string(),
                parameters_schema: t.parameters_schema(),
            })
            .collect()
    }
}
