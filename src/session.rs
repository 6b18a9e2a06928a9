//! Conversation session persistence.
//!
//! Sessions are stored whole: one row per session holding the full turn
//! list as JSON, rewritten on every save. Concurrent saves to the same
//! session are last-writer-wins.
//!
//! The store is deliberately infallible at the call site. Persistence is
//! an enhancement to the chat flow, not a prerequisite: if the database
//! is unreachable, loads return an empty history and saves are dropped,
//! both after logging, and the conversation continues memoryless.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use std::path::Path;
use tracing::{error, warn};

use crate::db;
use crate::models::ConversationTurn;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session's history. Unknown session or storage failure both
    /// yield an empty history.
    async fn load(&self, session_id: &str) -> Vec<ConversationTurn>;

    /// Overwrite a session's history. Failures are logged and dropped.
    async fn save(&self, session_id: &str, turns: &[ConversationTurn]);
}

/// SQLite-backed store. Built with [`SqliteSessionStore::connect`]; if
/// the database cannot be opened the store still constructs, degraded to
/// a no-op.
pub struct SqliteSessionStore {
    pool: Option<SqlitePool>,
}

impl SqliteSessionStore {
    pub async fn connect(db_path: &Path) -> Self {
        let pool = match Self::open(db_path).await {
            Ok(pool) => Some(pool),
            Err(e) => {
                error!(error = %e, path = %db_path.display(),
                    "session database unavailable, continuing without persistence");
                None
            }
        };
        Self { pool }
    }

    async fn open(db_path: &Path) -> anyhow::Result<SqlitePool> {
        let pool = db::connect(db_path).await?;
        db::run_migrations(&pool).await?;
        Ok(pool)
    }

    #[cfg(test)]
    pub fn disconnected() -> Self {
        Self { pool: None }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, session_id: &str) -> Vec<ConversationTurn> {
        let Some(pool) = &self.pool else {
            return Vec::new();
        };

        let row: Result<Option<(String,)>, _> =
            sqlx::query_as("SELECT messages FROM chat_sessions WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(pool)
                .await;

        match row {
            Ok(Some((messages,))) => match serde_json::from_str(&messages) {
                Ok(turns) => turns,
                Err(e) => {
                    // Treat a corrupt row as a fresh session rather than
                    // poisoning every later turn.
                    warn!(error = %e, session_id, "corrupt session row, starting fresh");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                error!(error = %e, session_id, "session load failed");
                Vec::new()
            }
        }
    }

    async fn save(&self, session_id: &str, turns: &[ConversationTurn]) {
        let Some(pool) = &self.pool else {
            warn!(session_id, "session database unavailable, turn not persisted");
            return;
        };

        let messages = match serde_json::to_string(turns) {
            Ok(messages) => messages,
            Err(e) => {
                error!(error = %e, session_id, "session serialization failed");
                return;
            }
        };

        let result = sqlx::query(
            r#"
            INSERT INTO chat_sessions (session_id, messages, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                messages = excluded.messages,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(session_id)
        .bind(messages)
        .bind(Utc::now().timestamp())
        .execute(pool)
        .await;

        if let Err(e) = result {
            error!(error = %e, session_id, "session save failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteSessionStore::connect(&dir.path().join("sessions.db")).await;

        let turns = vec![
            ConversationTurn::user("hello"),
            ConversationTurn::assistant("hi there"),
        ];
        store.save("s1", &turns).await;

        let loaded = store.load("s1").await;
        assert_eq!(loaded, turns);
    }

    #[tokio::test]
    async fn save_overwrites_whole_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteSessionStore::connect(&dir.path().join("sessions.db")).await;

        store.save("s1", &[ConversationTurn::user("first")]).await;
        let longer = vec![
            ConversationTurn::user("first"),
            ConversationTurn::assistant("reply"),
        ];
        store.save("s1", &longer).await;

        assert_eq!(store.load("s1").await, longer);
    }

    #[tokio::test]
    async fn unknown_session_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteSessionStore::connect(&dir.path().join("sessions.db")).await;
        assert!(store.load("nope").await.is_empty());
    }

    #[tokio::test]
    async fn disconnected_store_degrades_quietly() {
        let store = SqliteSessionStore::disconnected();
        store.save("s1", &[ConversationTurn::user("lost")]).await;
        assert!(store.load("s1").await.is_empty());
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteSessionStore::connect(&dir.path().join("sessions.db")).await;

        store.save("a", &[ConversationTurn::user("for a")]).await;
        store.save("b", &[ConversationTurn::user("for b")]).await;

        assert_eq!(store.load("a").await[0].text, "for a");
        assert_eq!(store.load("b").await[0].text, "for b");
    }
}
