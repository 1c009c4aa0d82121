//! The handle a tool execution receives: enough to act on behalf of a turn
//! without reaching back into the agent loop directly.

use serde_json::Value;
use tokio::sync::{mpsc, watch};

/// Per-call context handed to [`super::Tool::execute`].
#[derive(Clone)]
pub struct ToolContext {
    pub session_id: String,
    pub tool_call_id: String,
    cancel: watch::Receiver<bool>,
    update_tx: Option<mpsc::UnboundedSender<(String, Value)>>,
}

impl ToolContext {
    pub fn new(
        session_id: String,
        tool_call_id: String,
        cancel: watch::Receiver<bool>,
        update_tx: Option<mpsc::UnboundedSender<(String, Value)>>,
    ) -> Self {
        Self {
            session_id,
            tool_call_id,
            cancel,
            update_tx,
        }
    }

    /// True once the turn this tool call belongs to has been aborted.
    /// Long-running tools should poll this and unwind early; the executor
    /// also races execution against cancellation independently, so a tool
    /// that never checks still gets its result discarded.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Push a partial-update payload. The loop republishes these as
    /// `tool_execution_update` events but never persists them (an explicit
    /// design decision, noted in `DESIGN.md`). A tool with no sink wired up (e.g. under test) may
    /// call this freely; it is simply dropped.
    pub fn push_update(&self, payload: Value) {
        if let Some(tx) = &self.update_tx {
            let _ = tx.send((self.tool_call_id.clone(), payload));
        }
    }

    pub(crate) fn cancel_receiver(&self) -> watch::Receiver<bool> {
        self.cancel.clone()
    }
}
