//! End-to-end scenarios driving the public `Agent` API against a scripted
//! transport and a couple of trivial tools — no real provider involved.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use tokio::sync::watch;

use conductor::adapter::{BlockDelta, BlockStart, RawProviderEvent};
use conductor::agent::{Agent, AgentConfig, ModelDescriptor, ThinkingStyle};
use conductor::transport::{ProviderTransport, RawEventStream, TurnRequest};
use conductor::tools::{Tool, ToolContext, ToolError, ToolOutcome, ToolRegistry};
use conductor_llm::{Message, StopReason, UserContent};

fn test_model() -> ModelDescriptor {
    ModelDescriptor {
        id: "test-model".into(),
        provider: "test".into(),
        api_flavor: "test".into(),
        max_tokens: 4096,
        supports_vision: true,
        thinking_style: ThinkingStyle::Adaptive,
        is_canonical_endpoint: true,
        pricing: None,
    }
}

/// Replays a fixed sequence of scripted turns in order, regardless of what
/// the request actually contains, one per call to `open_stream`.
struct ScriptedTransport {
    turns: Mutex<Vec<Vec<RawProviderEvent>>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    fn new(turns: Vec<Vec<RawProviderEvent>>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().rev().collect()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ProviderTransport for ScriptedTransport {
    async fn open_stream(&self, _request: TurnRequest, _cancel: watch::Receiver<bool>) -> RawEventStream {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.turns.lock().pop().unwrap_or_default();
        Box::pin(stream::iter(next))
    }
}

/// A transport whose single turn never produces a terminal event until
/// cancelled — used to drive mid-stream abort scenarios deterministically.
struct HangingAfter {
    prefix: Vec<RawProviderEvent>,
}

#[async_trait]
impl ProviderTransport for HangingAfter {
    async fn open_stream(&self, _request: TurnRequest, _cancel: watch::Receiver<bool>) -> RawEventStream {
        let prefix = self.prefix.clone();
        Box::pin(stream::iter(prefix).chain(stream::pending()))
    }
}

fn text_turn(text: &str) -> Vec<RawProviderEvent> {
    vec![
        RawProviderEvent::MessageStart,
        RawProviderEvent::ContentBlockStart { index: 0, block: BlockStart::Text },
        RawProviderEvent::ContentBlockDelta { index: 0, delta: BlockDelta::Text(text.to_string()) },
        RawProviderEvent::ContentBlockStop { index: 0 },
        RawProviderEvent::MessageDelta { usage: None, stop_reason: Some("end_turn".into()) },
        RawProviderEvent::MessageStop,
    ]
}

fn tool_call_turn(id: &str, name: &str, arg_fragments: &[&str]) -> Vec<RawProviderEvent> {
    let mut events = vec![
        RawProviderEvent::MessageStart,
        RawProviderEvent::ContentBlockStart {
            index: 0,
            block: BlockStart::ToolCall { id: id.to_string(), name: name.to_string() },
        },
    ];
    for fragment in arg_fragments {
        events.push(RawProviderEvent::ContentBlockDelta {
            index: 0,
            delta: BlockDelta::ToolCallArguments(fragment.to_string()),
        });
    }
    events.push(RawProviderEvent::ContentBlockStop { index: 0 });
    events.push(RawProviderEvent::MessageDelta { usage: None, stop_reason: Some("tool_use".into()) });
    events.push(RawProviderEvent::MessageStop);
    events
}

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
        "echoes its text argument"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}})
    }
    async fn execute(&self, arguments: serde_json::Value, _cx: &ToolContext) -> Result<ToolOutcome, ToolError> {
        let text = arguments.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        Ok(ToolOutcome::text(text))
    }
}

/// Records the exact arguments it was called with, so the malformed-JSON
/// scenario can assert on the tolerant-parsed result.
struct RecordingTool {
    seen_arguments: Mutex<Option<serde_json::Value>>,
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        "record"
    }
    fn label(&self) -> &str {
        "Record"
    }
    fn description(&self) -> &str {
        "records its arguments"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }
    async fn execute(&self, arguments: serde_json::Value, _cx: &ToolContext) -> Result<ToolOutcome, ToolError> {
        *self.seen_arguments.lock() = Some(arguments);
        Ok(ToolOutcome::text("recorded"))
    }
}

#[tokio::test]
async fn scenario_1_no_tool_turn() {
    let transport = Arc::new(ScriptedTransport::new(vec![text_turn("Hi.")]));
    let config = AgentConfig::builder(test_model())
        .system_prompt("you are concise")
        .build();
    let agent = Agent::new(transport, None, config);

    agent
        .prompt(vec![Message::user("say hi in one word")])
        .await
        .unwrap();

    let messages = agent.messages();
    assert_eq!(messages.len(), 2);
    match &messages[0] {
        Message::User(u) => match &u.content {
            UserContent::Text(t) => assert_eq!(t, "say hi in one word"),
            other => panic!("unexpected content: {other:?}"),
        },
        other => panic!("unexpected: {other:?}"),
    }
    match &messages[1] {
        Message::Assistant(m) => {
            assert_eq!(m.stop_reason, StopReason::Stop);
            assert_eq!(m.content.len(), 1);
            match &m.content[0] {
                conductor_llm::ContentBlock::Text { text, .. } => assert_eq!(text, "Hi."),
                other => panic!("unexpected block: {other:?}"),
            }
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(!agent.is_streaming());
}

#[tokio::test]
async fn scenario_2_one_tool_round_trip() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        tool_call_turn("t1", "echo", &[r#"{"text":"hello"}"#]),
        text_turn("done."),
    ]));
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(Echo));
    let config = AgentConfig::builder(test_model()).tools(registry).build();
    let agent = Agent::new(transport, None, config);

    let mut rx = agent.subscribe();
    let drain = tokio::spawn(async move {
        let mut tool_events = Vec::new();
        while let Ok(event) = rx.recv().await {
            match event {
                conductor::agent::AgentLoopEvent::ToolExecutionStart { tool_call_id, .. } => {
                    tool_events.push(("start", tool_call_id))
                }
                conductor::agent::AgentLoopEvent::ToolExecutionEnd { result } => {
                    tool_events.push(("end", result.tool_call_id))
                }
                conductor::agent::AgentLoopEvent::AgentEnd => break,
                _ => {}
            }
        }
        tool_events
    });

    agent
        .prompt(vec![Message::user("use echo to say hello")])
        .await
        .unwrap();

    let tool_events = drain.await.unwrap();
    assert_eq!(
        tool_events,
        vec![("start", "t1".to_string()), ("end", "t1".to_string())]
    );

    let messages = agent.messages();
    assert_eq!(messages.len(), 4);
    assert!(matches!(messages[0], Message::User(_)));
    match &messages[1] {
        Message::Assistant(m) => assert_eq!(m.stop_reason, StopReason::ToolUse),
        other => panic!("unexpected: {other:?}"),
    }
    match &messages[2] {
        Message::ToolResult(r) => {
            assert_eq!(r.tool_call_id, "t1");
            assert!(!r.is_error);
            match &r.content[0] {
                conductor_llm::ContentBlock::Text { text, .. } => assert_eq!(text, "hello"),
                other => panic!("unexpected block: {other:?}"),
            }
        }
        other => panic!("unexpected: {other:?}"),
    }
    match &messages[3] {
        Message::Assistant(m) => assert_eq!(m.stop_reason, StopReason::Stop),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn scenario_3_steering_during_streaming() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        text_turn("a long first reply"),
        text_turn("ok, being brief now"),
    ]));
    let config = AgentConfig::builder(test_model()).build();
    let agent = Arc::new(Agent::new(transport, None, config));

    agent.steer(Message::user("actually, be brief"));
    agent
        .prompt(vec![Message::user("write something")])
        .await
        .unwrap();

    let messages = agent.messages();
    assert_eq!(messages.len(), 4);
    assert!(matches!(messages[0], Message::User(_)));
    assert!(matches!(messages[1], Message::Assistant(_)));
    match &messages[2] {
        Message::User(u) => match &u.content {
            UserContent::Text(t) => assert_eq!(t, "actually, be brief"),
            other => panic!("unexpected content: {other:?}"),
        },
        other => panic!("unexpected: {other:?}"),
    }
    assert!(matches!(messages[3], Message::Assistant(_)));
}

#[tokio::test]
async fn scenario_4_abort_mid_turn() {
    let transport = Arc::new(HangingAfter {
        prefix: vec![
            RawProviderEvent::MessageStart,
            RawProviderEvent::ContentBlockStart { index: 0, block: BlockStart::Text },
            RawProviderEvent::ContentBlockDelta { index: 0, delta: BlockDelta::Text("Once ".into()) },
            RawProviderEvent::ContentBlockDelta { index: 0, delta: BlockDelta::Text("upon a time".into()) },
        ],
    });
    let config = AgentConfig::builder(test_model()).build();
    let agent = Arc::new(Agent::new(transport, None, config));

    let a = agent.clone();
    let handle = tokio::spawn(async move { a.prompt(vec![Message::user("write a long poem")]).await });
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    agent.abort().await;
    handle.await.unwrap().unwrap();

    assert!(!agent.is_streaming());
    let messages = agent.messages();
    match messages.last() {
        Some(Message::Assistant(m)) => {
            assert_eq!(m.stop_reason, StopReason::Aborted);
            assert!(m.has_content() || m.error_message.is_some());
        }
        other => panic!("unexpected tail: {other:?}"),
    }
}

#[tokio::test]
async fn scenario_5_missing_tool() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        tool_call_turn("t1", "nonexistent", &["{}"]),
        text_turn("done."),
    ]));
    let config = AgentConfig::builder(test_model()).build();
    let agent = Agent::new(transport, None, config);

    agent
        .prompt(vec![Message::user("call a missing tool")])
        .await
        .unwrap();

    let messages = agent.messages();
    match &messages[2] {
        Message::ToolResult(r) => assert!(r.is_error),
        other => panic!("unexpected: {other:?}"),
    }
    match messages.last() {
        Some(Message::Assistant(m)) => assert_eq!(m.stop_reason, StopReason::Stop),
        other => panic!("unexpected tail: {other:?}"),
    }
}

#[tokio::test]
async fn scenario_6_malformed_tool_arguments_stream() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        tool_call_turn("t1", "record", &[r#"{"x":"#, "1"]),
        text_turn("done."),
    ]));
    let mut registry = ToolRegistry::new();
    let recorder = Arc::new(RecordingTool { seen_arguments: Mutex::new(None) });
    registry.register(recorder.clone());
    let config = AgentConfig::builder(test_model()).tools(registry).build();
    let agent = Agent::new(transport, None, config);

    agent
        .prompt(vec![Message::user("call record")])
        .await
        .unwrap();

    let seen = recorder.seen_arguments.lock().clone();
    assert_eq!(seen, Some(serde_json::json!({"x": 1})));

    let messages = agent.messages();
    match &messages[2] {
        Message::ToolResult(r) => assert!(!r.is_error),
        other => panic!("unexpected: {other:?}"),
    }
}
