//! SQLite session store.
//!
//! One database file with two tables:
//! - `sessions` — one row per conversation session
//! - `messages` — ordered messages, cascade-deleted with their session
//!
//! `append_turn` runs in a single transaction so a turn's message pair and
//! session updates commit together or not at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crabdesk_core::error::MemoryError;
use crabdesk_core::memory::{SessionStore, TurnUpdate};
use crabdesk_core::message::{Message, Role, SessionId};
use crabdesk_core::session::{
    ConversationSession, Intent, Language, RollingSummary, SessionStatus,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A durable SQLite session store.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Create a new SQLite store from a file path.
    ///
    /// The database and all tables/indexes are created automatically.
    /// Pass `":memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite session store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id               TEXT PRIMARY KEY,
                customer_id      TEXT,
                language         TEXT NOT NULL DEFAULT 'en',
                intent           TEXT NOT NULL DEFAULT 'unknown',
                sentiment        REAL NOT NULL DEFAULT 0.0,
                status           TEXT NOT NULL DEFAULT 'active',
                summary          TEXT,
                created_at       TEXT NOT NULL,
                last_activity_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                iid        INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                id         TEXT NOT NULL,
                role       TEXT NOT NULL,
                content    TEXT NOT NULL,
                timestamp  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::MigrationFailed(format!("messages index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_activity ON sessions(last_activity_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("activity index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn parse_timestamp(raw: &str) -> DateTime<Utc> {
        chrono::DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn parse_role(raw: &str) -> Role {
        match raw {
            "assistant" => Role::Assistant,
            "system" => Role::System,
            _ => Role::User,
        }
    }

    fn role_str(role: Role) -> &'static str {
        match role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    fn parse_status(raw: &str) -> SessionStatus {
        match raw {
            "resolved" => SessionStatus::Resolved,
            "escalated" => SessionStatus::Escalated,
            "expired" => SessionStatus::Expired,
            _ => SessionStatus::Active,
        }
    }

    fn parse_intent(raw: &str) -> Intent {
        match raw {
            "product_inquiry" => Intent::ProductInquiry,
            "pricing" => Intent::Pricing,
            "business_hours" => Intent::BusinessHours,
            "order_status" => Intent::OrderStatus,
            "complaint" => Intent::Complaint,
            "technical_support" => Intent::TechnicalSupport,
            "general_inquiry" => Intent::GeneralInquiry,
            "greeting" => Intent::Greeting,
            "farewell" => Intent::Farewell,
            _ => Intent::Unknown,
        }
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationSession, MemoryError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| MemoryError::QueryFailed(format!("id column: {e}")))?;
        let customer_id: Option<String> = row
            .try_get("customer_id")
            .map_err(|e| MemoryError::QueryFailed(format!("customer_id column: {e}")))?;
        let language: String = row
            .try_get("language")
            .map_err(|e| MemoryError::QueryFailed(format!("language column: {e}")))?;
        let intent: String = row
            .try_get("intent")
            .map_err(|e| MemoryError::QueryFailed(format!("intent column: {e}")))?;
        let sentiment: f32 = row.try_get("sentiment").unwrap_or(0.0);
        let status: String = row
            .try_get("status")
            .map_err(|e| MemoryError::QueryFailed(format!("status column: {e}")))?;
        let summary_json: Option<String> = row
            .try_get("summary")
            .map_err(|e| MemoryError::QueryFailed(format!("summary column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| MemoryError::QueryFailed(format!("created_at column: {e}")))?;
        let last_activity_at: String = row
            .try_get("last_activity_at")
            .map_err(|e| MemoryError::QueryFailed(format!("last_activity_at column: {e}")))?;

        let summary: Option<RollingSummary> =
            summary_json.and_then(|json| serde_json::from_str(&json).ok());

        Ok(ConversationSession {
            id: SessionId(id),
            customer_id,
            messages: Vec::new(),
            summary,
            language: Language::from_code(&language).unwrap_or_default(),
            intent: Self::parse_intent(&intent),
            sentiment,
            status: Self::parse_status(&status),
            created_at: Self::parse_timestamp(&created_at),
            last_activity_at: Self::parse_timestamp(&last_activity_at),
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, MemoryError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| MemoryError::QueryFailed(format!("message id column: {e}")))?;
        let role: String = row
            .try_get("role")
            .map_err(|e| MemoryError::QueryFailed(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| MemoryError::QueryFailed(format!("content column: {e}")))?;
        let timestamp: String = row
            .try_get("timestamp")
            .map_err(|e| MemoryError::QueryFailed(format!("timestamp column: {e}")))?;

        Ok(Message {
            id,
            role: Self::parse_role(&role),
            content,
            timestamp: Self::parse_timestamp(&timestamp),
            metadata: serde_json::Map::new(),
        })
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self, id: &SessionId) -> Result<Option<ConversationSession>, MemoryError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("session load: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut session = Self::row_to_session(&row)?;

        let message_rows =
            sqlx::query("SELECT * FROM messages WHERE session_id = ?1 ORDER BY iid")
                .bind(&id.0)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| MemoryError::QueryFailed(format!("message load: {e}")))?;

        session.messages = message_rows
            .iter()
            .map(Self::row_to_message)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(session))
    }

    async fn append_turn(
        &self,
        id: &SessionId,
        customer_id: Option<&str>,
        user_message: Message,
        assistant_message: Message,
        update: TurnUpdate,
    ) -> Result<(), MemoryError> {
        let existing = self.load(id).await?;
        let now = Utc::now();

        // Compute the post-turn session row up front; the transaction below
        // only writes.
        let mut session = existing
            .unwrap_or_else(|| ConversationSession::new(id.clone(), customer_id.map(String::from)));
        if let Some(summary) = update.summary {
            session.summary = Some(summary);
        }
        if let Some(status) = update.status {
            session.status = status;
        }
        if let Some(language) = update.language {
            session.language = language;
        }
        if let Some(intent) = update.intent {
            session.intent = intent;
        }
        if let Some(sentiment) = update.sentiment {
            session.sentiment = sentiment;
        }

        let summary_json = session
            .summary
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| MemoryError::Storage(format!("Summary serialization: {e}")))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("BEGIN failed: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO sessions
                (id, customer_id, language, intent, sentiment, status, summary, created_at, last_activity_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                language = excluded.language,
                intent = excluded.intent,
                sentiment = excluded.sentiment,
                status = excluded.status,
                summary = excluded.summary,
                last_activity_at = excluded.last_activity_at
            "#,
        )
        .bind(&id.0)
        .bind(session.customer_id.as_deref())
        .bind(session.language.code())
        .bind(session.intent.as_str())
        .bind(session.sentiment)
        .bind(session.status.as_str())
        .bind(summary_json.as_deref())
        .bind(session.created_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| MemoryError::Storage(format!("Session upsert failed: {e}")))?;

        for message in [&user_message, &assistant_message] {
            sqlx::query(
                "INSERT INTO messages (session_id, id, role, content, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&id.0)
            .bind(&message.id)
            .bind(Self::role_str(message.role))
            .bind(&message.content)
            .bind(message.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("Message insert failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(session_id = %id, "Turn committed");
        Ok(())
    }

    async fn purge_expired(&self, max_idle: chrono::Duration) -> Result<usize, MemoryError> {
        let cutoff = (Utc::now() - max_idle).to_rfc3339();
        let result = sqlx::query("DELETE FROM sessions WHERE last_activity_at < ?1")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("Purge failed: {e}")))?;

        let purged = result.rows_affected() as usize;
        if purged > 0 {
            info!(purged, "Purged expired sessions (retention window elapsed)");
        }
        Ok(purged)
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, MemoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("Delete failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM sessions")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("Count failed: {e}")))?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| MemoryError::QueryFailed(format!("n column: {e}")))?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crabdesk_core::session::SessionStatus;

    async fn temp_store() -> (tempfile::TempDir, SqliteSessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        let store = SqliteSessionStore::new(path.to_str().unwrap()).await.unwrap();
        (dir, store)
    }

    fn sid(s: &str) -> SessionId {
        SessionId::from(s)
    }

    #[tokio::test]
    async fn append_and_load_roundtrip() {
        let (_dir, store) = temp_store().await;

        store
            .append_turn(
                &sid("s1"),
                Some("cust_9"),
                Message::user("What are your business hours?"),
                Message::assistant("We are open 9am-6pm SGT."),
                TurnUpdate { sentiment: Some(0.2), ..Default::default() },
            )
            .await
            .unwrap();

        let session = store.load(&sid("s1")).await.unwrap().unwrap();
        assert_eq!(session.customer_id.as_deref(), Some("cust_9"));
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].role, Role::User);
        assert_eq!(session.messages[1].role, Role::Assistant);
        assert!((session.sentiment - 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn message_order_preserved_across_turns() {
        let (_dir, store) = temp_store().await;

        for i in 0..3 {
            store
                .append_turn(
                    &sid("s1"),
                    None,
                    Message::user(format!("q{i}")),
                    Message::assistant(format!("a{i}")),
                    TurnUpdate::default(),
                )
                .await
                .unwrap();
        }

        let session = store.load(&sid("s1")).await.unwrap().unwrap();
        let contents: Vec<_> = session.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q0", "a0", "q1", "a1", "q2", "a2"]);
    }

    #[tokio::test]
    async fn summary_roundtrip() {
        let (_dir, store) = temp_store().await;

        let summary = RollingSummary {
            text: "Customer asked about opening hours.".into(),
            key_topics: vec!["business hours".into()],
            action_items: vec![],
            covers_messages: 4,
            token_count: 12,
            updated_at: Utc::now(),
        };

        store
            .append_turn(
                &sid("s1"),
                None,
                Message::user("x"),
                Message::assistant("y"),
                TurnUpdate { summary: Some(summary.clone()), ..Default::default() },
            )
            .await
            .unwrap();

        let session = store.load(&sid("s1")).await.unwrap().unwrap();
        let loaded = session.summary.unwrap();
        assert_eq!(loaded.text, summary.text);
        assert_eq!(loaded.covers_messages, 4);
        assert_eq!(loaded.key_topics, vec!["business hours".to_string()]);
    }

    #[tokio::test]
    async fn status_update_persisted() {
        let (_dir, store) = temp_store().await;

        store
            .append_turn(
                &sid("s1"),
                None,
                Message::user("get me a human"),
                Message::assistant("Escalating."),
                TurnUpdate { status: Some(SessionStatus::Escalated), ..Default::default() },
            )
            .await
            .unwrap();

        let session = store.load(&sid("s1")).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Escalated);
    }

    #[tokio::test]
    async fn delete_cascades_messages() {
        let (_dir, store) = temp_store().await;

        store
            .append_turn(&sid("s1"), None, Message::user("x"), Message::assistant("y"), TurnUpdate::default())
            .await
            .unwrap();
        assert!(store.delete(&sid("s1")).await.unwrap());

        // Re-creating the session shows no orphaned messages
        store
            .append_turn(&sid("s1"), None, Message::user("new"), Message::assistant("turn"), TurnUpdate::default())
            .await
            .unwrap();
        let session = store.load(&sid("s1")).await.unwrap().unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].content, "new");
    }

    #[tokio::test]
    async fn purge_expired_deletes_idle_sessions() {
        let (_dir, store) = temp_store().await;

        store
            .append_turn(&sid("old"), None, Message::user("x"), Message::assistant("y"), TurnUpdate::default())
            .await
            .unwrap();

        // Backdate the session's activity directly
        sqlx::query("UPDATE sessions SET last_activity_at = ?1 WHERE id = 'old'")
            .bind((Utc::now() - chrono::Duration::days(31)).to_rfc3339())
            .execute(&store.pool)
            .await
            .unwrap();

        let purged = store.purge_expired(chrono::Duration::days(30)).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.load(&sid("old")).await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
