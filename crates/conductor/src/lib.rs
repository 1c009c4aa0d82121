//! Agent loop, streaming provider adapter and session event log for a
//! tool-using conversational runtime.
//!
//! Three tightly coupled subsystems, leaves first:
//!
//! - [`event_stream`] (C1) — the push-buffered single-consumer sequence
//!   every other layer is built on top of.
//! - [`adapter`] (C2) — decodes a provider's raw streaming protocol into
//!   the normalized `start → {block}_start/delta/end → done/error`
//!   sequence, maintaining the in-progress assistant message.
//! - [`tools`] (C3) — the tool registry and concurrent per-turn executor.
//! - [`transform`] (C4, alongside `conductor_llm::message`) — the pure
//!   pre-flight context transform applied before every provider request.
//! - [`session`] (C5) — the append-only session event log and its
//!   sqlite-backed implementation.
//! - [`agent`] (C6) — the turn/tool/interjection state machine tying
//!   everything above together.

pub mod adapter;
pub mod agent;
pub mod error;
pub mod event_stream;
pub mod sanitize;
pub mod session;
pub mod tolerant_json;
pub mod tools;
pub mod transform;
pub mod transport;

pub use error::AgentError;
