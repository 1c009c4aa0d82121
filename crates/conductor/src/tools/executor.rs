//! Concurrent dispatch of every tool call in one assistant message.
//!
//! All calls in a message run at once; the result list comes back in the
//! same order the calls appeared in, regardless of which one finished
//! first — callers never need to re-sort by tool-call id.

use futures::future::join_all;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};

use conductor_llm::{AssistantMessage, ToolResultMessage};

use super::context::ToolContext;
use super::registry::ToolRegistry;

/// Run every tool call in `assistant` against `registry`, racing each one
/// against `cancel`. A call already cancelled before it starts never runs;
/// one cancelled mid-flight has its result discarded in favor of a
/// synthesized aborted result, even if the underlying future eventually
/// would have completed.
///
/// `updates`, when given, receives `(tool_call_id, payload)` pairs pushed
/// by [`ToolContext::push_update`] for the caller to republish as
/// `tool_execution_update` events; these are never persisted.
pub async fn dispatch_tool_calls(
    assistant: &AssistantMessage,
    registry: &ToolRegistry,
    session_id: &str,
    cancel: &watch::Receiver<bool>,
    updates: Option<mpsc::UnboundedSender<(String, Value)>>,
) -> Vec<ToolResultMessage> {
    let calls: Vec<(String, String, serde_json::Value)> = assistant
        .tool_calls()
        .map(|(id, name, args)| (id.to_string(), name.to_string(), args.clone()))
        .collect();

    let futures = calls.into_iter().map(|(id, name, arguments)| {
        let registry = registry;
        let cx = ToolContext::new(
            session_id.to_string(),
            id.clone(),
            cancel.clone(),
            updates.clone(),
        );
        async move { run_one(id, name, arguments, registry, cx).await }
    });

    join_all(futures).await
}

async fn run_one(
    id: String,
    name: String,
    arguments: serde_json::Value,
    registry: &ToolRegistry,
    cx: ToolContext,
) -> ToolResultMessage {
    log::debug!(
        "executing tool: session={}, tool={}, call={}",
        cx.session_id, name, id
    );

    if cx.is_cancelled() {
        return aborted_result(id, name);
    }

    let Some(tool) = registry.find(&name) else {
        log::warn!("no tool registered with name {name:?} (call {id})");
        return ToolResultMessage::new(
            id,
            name.clone(),
            Vec::new(),
            true,
            Some(serde_json::json!({ "error": "tool_not_found" })),
            OffsetDateTime::now_utc(),
        )
        .with_error_text(format!("no tool registered with name {name:?}"));
    };

    let mut cancel_rx = cx.cancel_receiver();
    tokio::select! {
        biased;
        changed = cancel_rx.changed() => {
            let _ = changed;
            aborted_result(id, name)
        }
        outcome = tool.execute(arguments, &cx) => {
            match outcome {
                Ok(outcome) => ToolResultMessage::new(
                    id,
                    name,
                    outcome.content,
                    outcome.is_error,
                    outcome.details,
                    OffsetDateTime::now_utc(),
                ),
                Err(err) => ToolResultMessage::new(
                    id,
                    name,
                    Vec::new(),
                    true,
                    None,
                    OffsetDateTime::now_utc(),
                )
                .with_error_text(err.to_string()),
            }
        }
    }
}

fn aborted_result(id: String, name: String) -> ToolResultMessage {
    ToolResultMessage::new(
        id,
        name,
        Vec::new(),
        true,
        Some(serde_json::json!({ "error": "aborted" })),
        OffsetDateTime::now_utc(),
    )
    .with_error_text("tool call was aborted".to_string())
}

/// Small local extension so error results carry a human-readable message
/// without `ToolResultMessage::new` needing a separate error-text field.
trait WithErrorText {
    fn with_error_text(self, text: String) -> Self;
}

impl WithErrorText for ToolResultMessage {
    fn with_error_text(mut self, text: String) -> Self {
        if self.content.iter().all(|b| b.is_empty()) {
            self.content = vec![conductor_llm::ContentBlock::Text {
                text,
                signature: None,
            }];
        }
        self
    }
}
