//! In-memory session store — useful for testing and ephemeral deployments.

use async_trait::async_trait;
use chrono::Utc;
use crabdesk_core::error::MemoryError;
use crabdesk_core::memory::{SessionStore, TurnUpdate};
use crabdesk_core::message::{Message, SessionId};
use crabdesk_core::session::ConversationSession;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// A session store backed by a HashMap.
///
/// The write lock is held for the whole of `append_turn`, so a turn's
/// message pair and session updates commit atomically.
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, ConversationSession>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load(&self, id: &SessionId) -> Result<Option<ConversationSession>, MemoryError> {
        Ok(self.sessions.read().await.get(&id.0).cloned())
    }

    async fn append_turn(
        &self,
        id: &SessionId,
        customer_id: Option<&str>,
        user_message: Message,
        assistant_message: Message,
        update: TurnUpdate,
    ) -> Result<(), MemoryError> {
        let mut sessions = self.sessions.write().await;

        let session = sessions
            .entry(id.0.clone())
            .or_insert_with(|| ConversationSession::new(id.clone(), customer_id.map(String::from)));

        session.push(user_message);
        session.push(assistant_message);

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

        debug!(session_id = %id, messages = session.messages.len(), "Turn committed");
        Ok(())
    }

    async fn purge_expired(&self, max_idle: chrono::Duration) -> Result<usize, MemoryError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.idle_longer_than(max_idle, now));
        Ok(before - sessions.len())
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, MemoryError> {
        Ok(self.sessions.write().await.remove(&id.0).is_some())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.sessions.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crabdesk_core::session::{Intent, SessionStatus};

    fn sid(s: &str) -> SessionId {
        SessionId::from(s)
    }

    #[tokio::test]
    async fn first_turn_creates_session() {
        let store = InMemorySessionStore::new();
        assert!(store.load(&sid("s1")).await.unwrap().is_none());

        store
            .append_turn(
                &sid("s1"),
                Some("cust_1"),
                Message::user("hello"),
                Message::assistant("hi there"),
                TurnUpdate::default(),
            )
            .await
            .unwrap();

        let session = store.load(&sid("s1")).await.unwrap().unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.customer_id.as_deref(), Some("cust_1"));
        assert_eq!(session.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn append_preserves_arrival_order() {
        let store = InMemorySessionStore::new();
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
    async fn update_fields_applied() {
        let store = InMemorySessionStore::new();
        store
            .append_turn(
                &sid("s1"),
                None,
                Message::user("I want to speak to a human"),
                Message::assistant("Connecting you now."),
                TurnUpdate {
                    status: Some(SessionStatus::Escalated),
                    intent: Some(Intent::Complaint),
                    sentiment: Some(-0.6),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let session = store.load(&sid("s1")).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Escalated);
        assert_eq!(session.intent, Intent::Complaint);
        assert!((session.sentiment - (-0.6)).abs() < 1e-6);
    }

    #[tokio::test]
    async fn purge_removes_idle_sessions() {
        let store = InMemorySessionStore::new();
        store
            .append_turn(&sid("old"), None, Message::user("x"), Message::assistant("y"), TurnUpdate::default())
            .await
            .unwrap();
        store
            .append_turn(&sid("fresh"), None, Message::user("x"), Message::assistant("y"), TurnUpdate::default())
            .await
            .unwrap();

        // Backdate the old session's activity
        {
            let mut sessions = store.sessions.write().await;
            sessions.get_mut("old").unwrap().last_activity_at = Utc::now() - chrono::Duration::days(31);
        }

        let purged = store.purge_expired(chrono::Duration::days(30)).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.load(&sid("old")).await.unwrap().is_none());
        assert!(store.load(&sid("fresh")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_session() {
        let store = InMemorySessionStore::new();
        store
            .append_turn(&sid("s1"), None, Message::user("x"), Message::assistant("y"), TurnUpdate::default())
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.delete(&sid("s1")).await.unwrap());
        assert!(!store.delete(&sid("s1")).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
