//! A `rusqlite`-backed [`SessionStore`].
//!
//! Grounded on `crates/agent/src/session/sqlite.rs`'s `SqliteSessionStore`:
//! a single `Connection` behind `Arc<Mutex<_>>`, every operation run on a
//! blocking task via `run_blocking`, since `rusqlite` itself is
//! synchronous. One connection serializes all appends globally, which is a
//! strict superset of the per-session serialization the log needs.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use time::OffsetDateTime;

use super::error::SessionError;
use super::{EventKind, SessionEvent, SessionStore, SessionSummary};

#[derive(Clone)]
pub struct SqliteSessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSessionStore {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, rusqlite::Error> {
            let conn = Connection::open(path)?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS session_events (
                    session_id TEXT NOT NULL,
                    ordinal    INTEGER NOT NULL,
                    kind       TEXT NOT NULL,
                    payload    TEXT NOT NULL,
                    timestamp  TEXT NOT NULL,
                    PRIMARY KEY (session_id, ordinal)
                );",
            )?;
            Ok(conn)
        })
        .await
        .map_err(|e| SessionError::Storage(format!("spawn_blocking failed: {e}")))?
        .map_err(|e| SessionError::Storage(format!("connection failed: {e}")))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// An in-memory store, for tests and short-lived embeddings that don't
    /// need cross-process durability.
    pub async fn in_memory() -> Result<Self, SessionError> {
        Self::connect(":memory:").await
    }

    async fn run_blocking<F, R>(&self, f: F) -> Result<R, SessionError>
    where
        F: FnOnce(&Connection) -> Result<R, rusqlite::Error> + Send + 'static,
        R: Send + 'static,
    {
        let conn_arc = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn_arc.lock().unwrap();
            f(&conn)
        })
        .await
        .map_err(|e| SessionError::Storage(format!("spawn_blocking failed: {e}")))?
        .map_err(|e| SessionError::Storage(format!("sqlite error: {e}")))
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn append_event(
        &self,
        session_id: &str,
        kind: EventKind,
        payload: Value,
    ) -> Result<u64, SessionError> {
        let session_id = session_id.to_string();
        let kind_str = serde_json::to_string(&kind)
            .map_err(|e| SessionError::Storage(format!("serialize kind failed: {e}")))?;
        let payload_str = payload.to_string();
        let timestamp = OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(|e| SessionError::Storage(format!("format timestamp failed: {e}")))?;

        self.run_blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let next_ordinal: i64 = tx.query_row(
                "SELECT COALESCE(MAX(ordinal), 0) + 1 FROM session_events WHERE session_id = ?",
                params![session_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO session_events (session_id, ordinal, kind, payload, timestamp)
                 VALUES (?, ?, ?, ?, ?)",
                params![session_id, next_ordinal, kind_str, payload_str, timestamp],
            )?;
            tx.commit()?;
            Ok(next_ordinal as u64)
        })
        .await
    }

    async fn list_events(&self, session_id: &str) -> Result<Vec<SessionEvent>, SessionError> {
        let session_id_owned = session_id.to_string();
        let rows = self
            .run_blocking(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT ordinal, kind, payload, timestamp FROM session_events
                     WHERE session_id = ? ORDER BY ordinal ASC",
                )?;
                let rows = stmt
                    .query_map(params![session_id_owned], |row| {
                        let ordinal: i64 = row.get(0)?;
                        let kind: String = row.get(1)?;
                        let payload: String = row.get(2)?;
                        let timestamp: String = row.get(3)?;
                        Ok((ordinal, kind, payload, timestamp))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(ordinal, kind, payload, timestamp)| {
                let kind: EventKind = serde_json::from_str(&kind)
                    .map_err(|e| SessionError::Storage(format!("bad kind column: {e}")))?;
                let payload: Value = serde_json::from_str(&payload)
                    .map_err(|e| SessionError::Storage(format!("bad payload column: {e}")))?;
                let timestamp = OffsetDateTime::parse(
                    &timestamp,
                    &time::format_description::well_known::Rfc3339,
                )
                .map_err(|e| SessionError::Storage(format!("bad timestamp column: {e}")))?;
                Ok(SessionEvent {
                    session_id: session_id.to_string(),
                    ordinal: ordinal as u64,
                    kind,
                    payload,
                    timestamp,
                })
            })
            .collect()
    }

    async fn sessions_summary(&self, limit: usize) -> Result<Vec<SessionSummary>, SessionError> {
        let ids: Vec<String> = self
            .run_blocking(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT session_id FROM session_events
                     GROUP BY session_id
                     ORDER BY MAX(timestamp) DESC
                     LIMIT ?",
                )?;
                let ids = stmt
                    .query_map(params![limit as i64], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ids)
            })
            .await?;

        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            let events = self.list_events(&id).await?;
            let first_user_message = events
                .iter()
                .filter(|e| e.kind == EventKind::MessageEnd)
                .find_map(|e| {
                    let message: conductor_llm::Message =
                        serde_json::from_value(e.payload.clone()).ok()?;
                    match message {
                        conductor_llm::Message::User(u) => match u.content {
                            conductor_llm::UserContent::Text(t) => Some(t),
                            conductor_llm::UserContent::Blocks(blocks) => blocks
                                .into_iter()
                                .find_map(|b| match b {
                                    conductor_llm::ContentBlock::Text { text, .. } => Some(text),
                                    _ => None,
                                }),
                        },
                        _ => None,
                    }
                });
            let status = if events.iter().any(|e| e.kind == EventKind::AgentEnd) {
                "completed"
            } else {
                "in_progress"
            }
            .to_string();
            let completed_at = events
                .iter()
                .rev()
                .find(|e| e.kind == EventKind::AgentEnd)
                .map(|e| e.timestamp);

            summaries.push(SessionSummary {
                id,
                first_user_message,
                status,
                event_count: events.len() as u64,
                completed_at,
            });
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ordinals_start_at_one_and_increase_contiguously() {
        let store = SqliteSessionStore::in_memory().await.unwrap();
        let a = store
            .append_event("s1", EventKind::AgentStart, serde_json::json!({}))
            .await
            .unwrap();
        let b = store
            .append_event("s1", EventKind::TurnStart, serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[tokio::test]
    async fn distinct_sessions_have_independent_ordinals() {
        let store = SqliteSessionStore::in_memory().await.unwrap();
        store
            .append_event("s1", EventKind::AgentStart, serde_json::json!({}))
            .await
            .unwrap();
        let first_of_s2 = store
            .append_event("s2", EventKind::AgentStart, serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(first_of_s2, 1);
    }

    #[tokio::test]
    async fn list_events_returns_ordinal_order() {
        let store = SqliteSessionStore::in_memory().await.unwrap();
        for _ in 0..5 {
            store
                .append_event("s1", EventKind::MessageUpdate, serde_json::json!({}))
                .await
                .unwrap();
        }
        let events = store.list_events("s1").await.unwrap();
        let ordinals: Vec<u64> = events.iter().map(|e| e.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn append_then_replay_then_reconstruct_round_trips() {
        let store = SqliteSessionStore::in_memory().await.unwrap();
        let user = conductor_llm::Message::user("hello");
        store
            .append_event(
                "s1",
                EventKind::MessageEnd,
                serde_json::to_value(&user).unwrap(),
            )
            .await
            .unwrap();

        let reconstructed = store.reconstruct("s1").await.unwrap();
        assert_eq!(reconstructed.len(), 1);
        assert_eq!(reconstructed[0], user);
    }

    #[tokio::test]
    async fn sessions_summary_reports_status_and_first_user_message() {
        let store = SqliteSessionStore::in_memory().await.unwrap();
        let user = conductor_llm::Message::user("say hi");
        store
            .append_event(
                "s1",
                EventKind::MessageEnd,
                serde_json::to_value(&user).unwrap(),
            )
            .await
            .unwrap();
        store
            .append_event("s1", EventKind::AgentEnd, serde_json::json!({}))
            .await
            .unwrap();

        let summaries = store.sessions_summary(10).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].status, "completed");
        assert_eq!(summaries[0].first_user_message.as_deref(), Some("say hi"));
    }

    #[tokio::test]
    async fn events_survive_a_reconnect_to_the_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.sqlite3");

        let store = SqliteSessionStore::connect(&path).await.unwrap();
        store
            .append_event("s1", EventKind::AgentStart, serde_json::json!({}))
            .await
            .unwrap();
        drop(store);

        let reopened = SqliteSessionStore::connect(&path).await.unwrap();
        let events = reopened.list_events("s1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].ordinal, 1);
    }
}
