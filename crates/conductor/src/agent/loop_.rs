//! The agent loop itself (C6): `IDLE → PREPARING → STREAMING → (TOOLING →
//! POLLING → STREAMING)* → FINALIZING → IDLE`.
//!
//! Modeled after an `execute_cycle_state_machine`-style loop
//! (`loop { state = match state {...} }`) but simplified down to a
//! single-session, no-actor model: one `Agent` owns its own committed
//! message list, its own interjection queues, and drives its own state
//! transitions directly rather than dispatching through an external actor
//! runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch, Notify};

use conductor_llm::{AssistantMessage, Message, StopReason};

use crate::error::AgentError;
use crate::tools::dispatch_tool_calls;
use crate::transform::{transform, ModelCapabilities, TransformContext};
use crate::transport::{ProviderTransport, TurnRequest};
use crate::adapter::{decode_stream, NormalizedEvent};
use crate::session::SessionStore;

use super::config::{resolve_thinking_params, AgentConfig, ModelDescriptor, ThinkingLevel};
use super::events::{assistant_message_end, AgentLoopEvent};
use super::queues::InterjectionQueue;

/// How one turn ended, deciding what `POLLING` (or its absence) does next.
enum TurnOutcome {
    ToolUse,
    Stopped,
    /// Error or aborted: proceed straight to `FINALIZING`.
    Terminal,
}

/// One conversational agent instance: committed messages, interjection
/// queues, and the configuration bundle a call reads from. Not `Clone` —
/// callers share one instance across tasks via `Arc<Agent>`.
pub struct Agent {
    transport: Arc<dyn ProviderTransport>,
    session_store: Option<Arc<dyn SessionStore>>,
    config: RwLock<AgentConfig>,
    messages: Mutex<Vec<Message>>,
    steering: Mutex<InterjectionQueue>,
    follow_up: Mutex<InterjectionQueue>,
    is_streaming: AtomicBool,
    idle: Notify,
    cancel: Mutex<watch::Sender<bool>>,
    events: broadcast::Sender<AgentLoopEvent>,
}

impl Agent {
    pub fn new(
        transport: Arc<dyn ProviderTransport>,
        session_store: Option<Arc<dyn SessionStore>>,
        config: AgentConfig,
    ) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        let (events_tx, _) = broadcast::channel(1024);
        Self {
            transport,
            session_store,
            config: RwLock::new(config),
            messages: Mutex::new(Vec::new()),
            steering: Mutex::new(InterjectionQueue::default()),
            follow_up: Mutex::new(InterjectionQueue::default()),
            is_streaming: AtomicBool::new(false),
            idle: Notify::new(),
            cancel: Mutex::new(cancel_tx),
            events: events_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentLoopEvent> {
        self.events.subscribe()
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming.load(Ordering::SeqCst)
    }

    pub async fn wait_for_idle(&self) {
        while self.is_streaming() {
            self.idle.notified().await;
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub fn set_system_prompt(&self, prompt: impl Into<String>) {
        self.config.write().system_prompt = Some(prompt.into());
    }

    pub fn set_model(&self, model: ModelDescriptor) {
        self.config.write().model = model;
    }

    pub fn set_thinking_level(&self, level: ThinkingLevel) {
        self.config.write().thinking_level = level;
    }

    pub fn set_tools(&self, tools: crate::tools::ToolRegistry) {
        self.config.write().tools = Arc::new(tools);
    }

    pub fn replace_messages(&self, messages: Vec<Message>) {
        *self.messages.lock() = messages;
    }

    pub fn append_message(&self, message: Message) {
        self.messages.lock().push(message);
    }

    pub fn clear_messages(&self) {
        self.messages.lock().clear();
    }

    /// Clears committed messages and both interjection queues. Config
    /// (model, tools, thinking level, ...) is left untouched.
    pub fn reset(&self) {
        self.messages.lock().clear();
        self.steering.lock().clear();
        self.follow_up.lock().clear();
    }

    /// Queue a high-priority interjection, to be appended and used as the
    /// next turn's input once the in-flight turn reaches `POLLING`.
    pub fn steer(&self, message: Message) {
        self.steering.lock().push(message);
    }

    /// Queue a lower-priority message, consulted only once steering is
    /// drained.
    pub fn follow_up(&self, message: Message) {
        self.follow_up.lock().push(message);
    }

    /// Cancel the in-flight adapter stream and every in-flight tool
    /// execution. A no-op if nothing is currently streaming.
    pub async fn abort(&self) {
        let _ = self.cancel.lock().send(true);
    }

    /// Submit new user messages and drive turns until the loop reaches
    /// `FINALIZING`. Fails with `Busy` if a call is already in progress.
    pub async fn prompt(&self, messages: Vec<Message>) -> Result<(), AgentError> {
        if messages.is_empty() {
            return Err(AgentError::Precondition(
                "prompt requires at least one message".into(),
            ));
        }
        if messages.iter().all(is_empty_user_message) {
            return Err(AgentError::Precondition(
                "empty user message with no images".into(),
            ));
        }
        let cancel_rx = self.begin_call()?;
        self.run_call(Some(messages), false, cancel_rx).await;
        Ok(())
    }

    /// Resume from the current tail with no new user messages. Requires
    /// the tail to be a non-assistant message, or an assistant tail with
    /// at least one queued interjection.
    pub async fn continue_(&self) -> Result<(), AgentError> {
        let skip_initial_steering_poll = {
            let messages = self.messages.lock();
            if messages.is_empty() {
                return Err(AgentError::Precondition("no messages yet".into()));
            }
            let tail_is_assistant = matches!(messages.last(), Some(Message::Assistant(_)));
            if tail_is_assistant {
                let steering_empty = self.steering.lock().is_empty();
                let follow_up_empty = self.follow_up.lock().is_empty();
                if steering_empty && follow_up_empty {
                    return Err(AgentError::Precondition(
                        "assistant tail with both interjection queues empty".into(),
                    ));
                }
            }
            tail_is_assistant
        };
        let cancel_rx = self.begin_call()?;
        self.run_call(None, skip_initial_steering_poll, cancel_rx)
            .await;
        Ok(())
    }

    fn begin_call(&self) -> Result<watch::Receiver<bool>, AgentError> {
        if self
            .is_streaming
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("rejecting call: agent already streaming");
            return Err(AgentError::Busy);
        }
        let (tx, rx) = watch::channel(false);
        *self.cancel.lock() = tx;
        Ok(rx)
    }

    fn end_call(&self) {
        self.is_streaming.store(false, Ordering::SeqCst);
        self.idle.notify_waiters();
    }

    #[tracing::instrument(name = "agent.transition.run_call", skip(self, initial, cancel_rx))]
    async fn run_call(
        &self,
        initial: Option<Vec<Message>>,
        skip_initial_steering_poll: bool,
        cancel_rx: watch::Receiver<bool>,
    ) {
        let session_id = self.config.read().session_id.clone();
        self.emit(AgentLoopEvent::AgentStart, session_id.as_deref())
            .await;

        if let Some(initial_messages) = initial {
            for message in initial_messages {
                self.commit_message(message, session_id.as_deref()).await;
            }
        } else if skip_initial_steering_poll {
            // Immediately after `continue()` on an assistant tail, drain
            // steering first rather than waiting for the provider stream's
            // own initial poll point, so caller interjections take
            // precedence over a fresh model turn.
            let mode = self.config.read().steering_mode;
            let drained = self.steering.lock().dispatch(mode);
            for message in drained {
                self.commit_message(message, session_id.as_deref()).await;
            }
        }

        loop {
            if *cancel_rx.borrow() {
                break;
            }

            log::debug!("turn starting");
            self.emit(AgentLoopEvent::TurnStart, session_id.as_deref())
                .await;
            let outcome = self.run_one_turn(session_id.as_deref(), &cancel_rx).await;
            self.emit(AgentLoopEvent::TurnEnd, session_id.as_deref())
                .await;

            match outcome {
                TurnOutcome::ToolUse => {
                    log::debug!("turn ended in tool use, polling queues before the next turn");
                    // A tool-use turn always continues regardless of
                    // whether any interjection is queued -- the tool
                    // results themselves are the new content the next
                    // turn needs to see.
                    for message in self.poll_queues() {
                        self.commit_message(message, session_id.as_deref()).await;
                    }
                }
                TurnOutcome::Stopped => {
                    let next = self.poll_queues();
                    if next.is_empty() {
                        log::debug!("turn stopped with no queued interjections, finalizing");
                        break;
                    }
                    log::debug!("turn stopped, draining {} queued interjection(s)", next.len());
                    for message in next {
                        self.commit_message(message, session_id.as_deref()).await;
                    }
                }
                TurnOutcome::Terminal => {
                    log::debug!("turn ended terminally, finalizing");
                    break;
                }
            }
        }

        self.emit(AgentLoopEvent::AgentEnd, session_id.as_deref())
            .await;
        self.end_call();
    }

    /// Consult steering then follow-up in priority order: steering is
    /// dispatched (per its mode) if non-empty; follow-up is only
    /// consulted when steering is empty.
    fn poll_queues(&self) -> Vec<Message> {
        let (steering_mode, follow_up_mode) = {
            let config = self.config.read();
            (config.steering_mode, config.follow_up_mode)
        };
        let steering = self.steering.lock().dispatch(steering_mode);
        if !steering.is_empty() {
            return steering;
        }
        self.follow_up.lock().dispatch(follow_up_mode)
    }

    async fn commit_message(&self, message: Message, session_id: Option<&str>) {
        let role = match &message {
            Message::User(_) => "user",
            Message::Assistant(_) => "assistant",
            Message::ToolResult(_) => "tool_result",
        };
        self.emit(AgentLoopEvent::MessageStart { role }, session_id)
            .await;
        self.emit(
            AgentLoopEvent::MessageEnd {
                message: message.clone(),
            },
            session_id,
        )
        .await;
        self.messages.lock().push(message);
    }

    #[tracing::instrument(name = "agent.transition.run_one_turn", skip(self, cancel_rx))]
    async fn run_one_turn(
        &self,
        session_id: Option<&str>,
        cancel_rx: &watch::Receiver<bool>,
    ) -> TurnOutcome {
        let config = self.config.read().clone();
        let committed = self.messages.lock().clone();

        let context_messages = match &config.context_transform {
            Some(hook) => hook.transform(committed, cancel_rx.clone()).await,
            None => committed,
        };

        let transform_ctx = TransformContext {
            capabilities: ModelCapabilities {
                supports_vision: config.model.supports_vision,
            },
            cache_retention: config.cache_retention,
            is_canonical_endpoint: config.model.is_canonical_endpoint,
        };
        let transformed = transform(&context_messages, &transform_ctx);

        let thinking =
            resolve_thinking_params(config.thinking_level, &config.model, config.thinking_budgets.as_deref());
        let api_key = config
            .api_key_resolver
            .as_ref()
            .and_then(|resolver| resolver.resolve(&config.model.provider));

        let request = TurnRequest {
            system_prompt: config.system_prompt.clone(),
            messages: transformed.messages,
            tools: config.tools.definitions(),
            model: config.model.clone(),
            thinking,
            api_key,
            cache_breakpoints: transformed.cache_breakpoints,
        };

        let raw = self.transport.open_stream(request, cancel_rx.clone()).await;
        let mut stream = decode_stream(
            raw,
            cancel_rx.clone(),
            config.model.id.clone(),
            config.model.provider.clone(),
            config.model.api_flavor.clone(),
            config.model.pricing,
        );

        self.emit(
            AgentLoopEvent::MessageStart { role: "assistant" },
            session_id,
        )
        .await;

        let mut terminal: Option<AssistantMessage> = None;
        while let Some(event) = stream.next().await {
            match &event {
                NormalizedEvent::Done { partial, .. } | NormalizedEvent::Error { partial, .. } => {
                    terminal = Some(partial.clone());
                }
                _ => {}
            }
            self.emit(AgentLoopEvent::MessageUpdate(event), session_id)
                .await;
        }

        let Some(mut assistant) = terminal else {
            let assistant = AssistantMessage::degenerate(
                config.model.id.clone(),
                config.model.provider.clone(),
                config.model.api_flavor.clone(),
                StopReason::Error,
                "provider stream ended with no terminal event".to_string(),
                time::OffsetDateTime::now_utc(),
            );
            self.emit(assistant_message_end(assistant.clone()), session_id)
                .await;
            self.messages.lock().push(Message::Assistant(assistant));
            return TurnOutcome::Terminal;
        };

        // Abort mid-turn: retain the partial only if it has real content;
        // otherwise replace it with a degenerate aborted message.
        if assistant.stop_reason == StopReason::Aborted && !assistant.has_content() {
            assistant = AssistantMessage::degenerate(
                assistant.model.clone(),
                assistant.provider.clone(),
                assistant.api_flavor.clone(),
                StopReason::Aborted,
                assistant
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "turn was cancelled".to_string()),
                assistant.created_at,
            );
        } else if !assistant.has_content() && assistant.error_message.is_none() {
            // A clean stream end with only empty/whitespace blocks is not
            // appended as-is -- still commit a degenerate message so the
            // list stays well-formed.
            assistant = AssistantMessage::degenerate(
                assistant.model.clone(),
                assistant.provider.clone(),
                assistant.api_flavor.clone(),
                assistant.stop_reason,
                "assistant produced no content".to_string(),
                assistant.created_at,
            );
        }

        let stop_reason = assistant.stop_reason;
        log::info!("turn completed with stop reason {stop_reason:?}");
        self.emit(assistant_message_end(assistant.clone()), session_id)
            .await;
        self.messages.lock().push(Message::Assistant(assistant.clone()));

        match stop_reason {
            StopReason::ToolUse => {
                self.dispatch_tools(&assistant, session_id, cancel_rx).await;
                TurnOutcome::ToolUse
            }
            StopReason::Stop | StopReason::Length => TurnOutcome::Stopped,
            StopReason::Error | StopReason::Aborted => TurnOutcome::Terminal,
        }
    }

    #[tracing::instrument(name = "agent.transition.processing_tool_calls", skip(self, assistant, cancel_rx))]
    async fn dispatch_tools(
        &self,
        assistant: &AssistantMessage,
        session_id: Option<&str>,
        cancel_rx: &watch::Receiver<bool>,
    ) {
        let registry = self.config.read().tools.clone();
        log::debug!(
            "dispatching {} tool call(s) concurrently",
            assistant.tool_calls().count()
        );

        for (id, name, _) in assistant.tool_calls() {
            self.emit(
                AgentLoopEvent::ToolExecutionStart {
                    tool_call_id: id.to_string(),
                    name: name.to_string(),
                },
                session_id,
            )
            .await;
        }

        let (update_tx, mut update_rx) = mpsc::unbounded_channel::<(String, Value)>();
        let events = self.events.clone();
        let forward = tokio::spawn(async move {
            while let Some((tool_call_id, payload)) = update_rx.recv().await {
                let _ = events.send(AgentLoopEvent::ToolExecutionUpdate {
                    tool_call_id,
                    payload,
                });
            }
        });

        let results = dispatch_tool_calls(
            assistant,
            &registry,
            session_id.unwrap_or(""),
            cancel_rx,
            Some(update_tx),
        )
        .await;
        let _ = forward.await;

        for result in results {
            self.emit(
                AgentLoopEvent::ToolExecutionEnd {
                    result: result.clone(),
                },
                session_id,
            )
            .await;
            self.messages.lock().push(Message::ToolResult(result));
        }
    }

    async fn emit(&self, event: AgentLoopEvent, session_id: Option<&str>) {
        let _ = self.events.send(event.clone());
        if let (Some(store), Some(session_id)) = (&self.session_store, session_id) {
            if let Some(kind) = event.persisted_kind() {
                let payload = event.payload();
                if let Err(err) = store.append_event(session_id, kind, payload).await {
                    tracing::warn!(session_id, error = %err, "session event append failed");
                }
            }
        }
    }
}

fn is_empty_user_message(message: &Message) -> bool {
    matches!(message, Message::User(u) if u.content.is_empty())
}
