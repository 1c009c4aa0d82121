//! Tool registration and concurrent execution for one assistant turn.

mod context;
mod error;
mod executor;
mod registry;

pub use context::ToolContext;
pub use error::ToolError;
pub use executor::dispatch_tool_calls;
pub use registry::{json_schema_for, Tool, ToolDefinition, ToolOutcome, ToolRegistry};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conductor_llm::{AssistantMessage, ContentBlock, StopReason, Usage};
    use std::sync::Arc;
    use time::OffsetDateTime;
    use tokio::sync::watch;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn label(&self) -> &str {
            "Echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
            _cx: &ToolContext,
        ) -> Result<ToolOutcome, ToolError> {
            Ok(ToolOutcome::text(arguments.to_string()))
        }
    }

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn label(&self) -> &str {
            "Slow"
        }
        fn description(&self) -> &str {
            "never finishes"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
            _cx: &ToolContext,
        ) -> Result<ToolOutcome, ToolError> {
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    fn assistant_with_calls(calls: &[(&str, &str)]) -> AssistantMessage {
        AssistantMessage {
            content: calls
                .iter()
                .map(|(id, name)| ContentBlock::ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: serde_json::json!({"n": 1}),
                    thought_signature: None,
                })
                .collect(),
            model: "m".into(),
            provider: "p".into(),
            api_flavor: "f".into(),
            usage: Usage::default(),
            stop_reason: StopReason::ToolUse,
            error_message: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn dispatches_calls_concurrently_preserving_original_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo));
        let assistant = assistant_with_calls(&[("a", "echo"), ("b", "echo"), ("c", "echo")]);
        let (_tx, rx) = watch::channel(false);

        let results = dispatch_tool_calls(&assistant, &registry, "session-1", &rx, None).await;
        let ids: Vec<&str> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(results.iter().all(|r| !r.is_error));
    }

    #[tokio::test]
    async fn missing_tool_synthesizes_an_error_result() {
        let registry = ToolRegistry::new();
        let assistant = assistant_with_calls(&[("a", "nonexistent")]);
        let (_tx, rx) = watch::channel(false);

        let results = dispatch_tool_calls(&assistant, &registry, "session-1", &rx, None).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_error);
    }

    #[derive(serde::Deserialize, schemars::JsonSchema)]
    struct EchoArgs {
        text: String,
    }

    #[test]
    fn json_schema_for_derives_an_object_schema_from_the_args_struct() {
        let schema = json_schema_for::<EchoArgs>();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["text"].is_object());
    }

    #[tokio::test]
    async fn cancellation_discards_an_in_flight_call() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Slow));
        let assistant = assistant_with_calls(&[("a", "slow")]);
        let (tx, rx) = watch::channel(false);

        let dispatch = dispatch_tool_calls(&assistant, &registry, "session-1", &rx, None);
        tx.send(true).unwrap();
        let results = dispatch.await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_error);
    }
}
