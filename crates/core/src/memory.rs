//! Session store trait — durable conversation memory.
//!
//! The store is only ever touched by the owning session's serialized turn,
//! so implementations need transactionality, not fine-grained locking:
//! `append_turn` commits the user message, the assistant message, and any
//! summary/status/analysis updates together, or not at all.

use async_trait::async_trait;

use crate::error::MemoryError;
use crate::message::{Message, SessionId};
use crate::session::{ConversationSession, Intent, Language, RollingSummary, SessionStatus};

/// Session-level updates committed alongside a turn's messages.
#[derive(Debug, Clone, Default)]
pub struct TurnUpdate {
    /// New rolling summary, when refreshed this turn
    pub summary: Option<RollingSummary>,

    /// New lifecycle status, when changed this turn
    pub status: Option<SessionStatus>,

    /// Detected language for the session
    pub language: Option<Language>,

    /// Detected intent of the latest user message
    pub intent: Option<Intent>,

    /// Updated sentiment estimate
    pub sentiment: Option<f32>,
}

/// Durable store of conversation sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Load a session by id. `None` when no turn has ever committed for it.
    async fn load(&self, id: &SessionId) -> Result<Option<ConversationSession>, MemoryError>;

    /// Commit one turn atomically.
    ///
    /// Creates the session if it does not exist (first committed turn),
    /// appends `user_message` then `assistant_message` in order, and applies
    /// `update`. All of it commits together or none of it does.
    async fn append_turn(
        &self,
        id: &SessionId,
        customer_id: Option<&str>,
        user_message: Message,
        assistant_message: Message,
        update: TurnUpdate,
    ) -> Result<(), MemoryError>;

    /// Expire and delete sessions idle longer than `max_idle`.
    ///
    /// Returns the number of sessions removed. PDPA retention: expired
    /// session data must actually be deleted, not just flagged.
    async fn purge_expired(&self, max_idle: chrono::Duration) -> Result<usize, MemoryError>;

    /// Delete a single session and all of its messages.
    async fn delete(&self, id: &SessionId) -> Result<bool, MemoryError>;

    /// Total stored sessions.
    async fn count(&self) -> Result<usize, MemoryError>;
}
