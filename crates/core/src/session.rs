//! Conversation session state — the unit of ongoing dialogue.
//!
//! A session owns its messages outright (deleting a session deletes its
//! messages; customers hold session *ids*, never back-references), carries a
//! rolling summary once the history grows past the summarization threshold,
//! and moves through a small lifecycle: active → resolved | escalated |
//! expired. `Escalated` is terminal for the engine — a human takes over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{Message, Role, SessionId};

/// Conversation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Accepting automated turns.
    Active,
    /// Closed by the customer or by feedback.
    Resolved,
    /// Handed to a human; no further automated responses.
    Escalated,
    /// Idle past the retention window; eligible for deletion.
    Expired,
}

impl SessionStatus {
    /// Terminal statuses reject further automated turns.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Escalated | Self::Expired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Resolved => "resolved",
            Self::Escalated => "escalated",
            Self::Expired => "expired",
        }
    }
}

/// Detected user intent categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ProductInquiry,
    Pricing,
    BusinessHours,
    OrderStatus,
    Complaint,
    TechnicalSupport,
    GeneralInquiry,
    Greeting,
    Farewell,
    #[default]
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProductInquiry => "product_inquiry",
            Self::Pricing => "pricing",
            Self::BusinessHours => "business_hours",
            Self::OrderStatus => "order_status",
            Self::Complaint => "complaint",
            Self::TechnicalSupport => "technical_support",
            Self::GeneralInquiry => "general_inquiry",
            Self::Greeting => "greeting",
            Self::Farewell => "farewell",
            Self::Unknown => "unknown",
        }
    }
}

/// Supported customer languages (Singapore market).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English — primary business language
    #[default]
    En,
    /// Mandarin
    Zh,
    /// Malay
    Ms,
    /// Tamil
    Ta,
}

impl Language {
    /// ISO 639-1 code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Zh => "zh",
            Self::Ms => "ms",
            Self::Ta => "ta",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "en" => Some(Self::En),
            "zh" => Some(Self::Zh),
            "ms" => Some(Self::Ms),
            "ta" => Some(Self::Ta),
            _ => None,
        }
    }
}

/// Rolling summary of the oldest span of a session's history.
///
/// `covers_messages` is the watermark: messages `[0, covers_messages)` are
/// represented by `text` and are no longer rendered raw during assembly.
/// Re-summarizing a span that is already covered is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingSummary {
    /// Condensed summary text.
    pub text: String,

    /// Key topics extracted by the summarizer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_topics: Vec<String>,

    /// Outstanding action items extracted by the summarizer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_items: Vec<String>,

    /// Number of leading messages this summary covers.
    pub covers_messages: usize,

    /// Token count of `text` as reported by the summarizer.
    pub token_count: usize,

    /// When the summary was last refreshed.
    pub updated_at: DateTime<Utc>,
}

/// The unit of ongoing dialogue state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    /// Unique session ID
    pub id: SessionId,

    /// Optional customer reference (non-owning, by id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,

    /// Ordered messages, append order == committed-turn arrival order
    pub messages: Vec<Message>,

    /// Rolling summary of the oldest messages, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<RollingSummary>,

    /// Detected customer language
    #[serde(default)]
    pub language: Language,

    /// Detected intent of the latest user message
    #[serde(default)]
    pub intent: Intent,

    /// Sentiment estimate in [-1, 1], blended across turns
    #[serde(default)]
    pub sentiment: f32,

    /// Lifecycle status
    pub status: SessionStatus,

    /// When this session was created
    pub created_at: DateTime<Utc>,

    /// When the last turn was committed
    pub last_activity_at: DateTime<Utc>,
}

impl ConversationSession {
    /// Create a new active session.
    pub fn new(id: SessionId, customer_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            customer_id,
            messages: Vec::new(),
            summary: None,
            language: Language::default(),
            intent: Intent::default(),
            sentiment: 0.0,
            status: SessionStatus::Active,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Append a message and bump the activity timestamp.
    pub fn push(&mut self, message: Message) {
        self.last_activity_at = Utc::now();
        self.messages.push(message);
    }

    /// The most recent user message, if any.
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    /// Number of leading messages already covered by the rolling summary.
    pub fn summarized_until(&self) -> usize {
        self.summary.as_ref().map(|s| s.covers_messages).unwrap_or(0)
    }

    /// Whether the session has been idle longer than `max_idle`.
    pub fn idle_longer_than(&self, max_idle: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.last_activity_at > max_idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_active() {
        let session = ConversationSession::new(SessionId::from("sess_1"), None);
        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.messages.is_empty());
        assert_eq!(session.sentiment, 0.0);
    }

    #[test]
    fn escalated_is_terminal() {
        assert!(SessionStatus::Escalated.is_terminal());
        assert!(SessionStatus::Expired.is_terminal());
        assert!(!SessionStatus::Active.is_terminal());
        assert!(!SessionStatus::Resolved.is_terminal());
    }

    #[test]
    fn push_updates_activity() {
        let mut session = ConversationSession::new(SessionId::new(), None);
        let before = session.last_activity_at;
        session.push(Message::user("hello"));
        assert_eq!(session.messages.len(), 1);
        assert!(session.last_activity_at >= before);
    }

    #[test]
    fn last_user_message_skips_assistant() {
        let mut session = ConversationSession::new(SessionId::new(), None);
        session.push(Message::user("first"));
        session.push(Message::assistant("reply"));
        assert_eq!(session.last_user_message().unwrap().content, "first");
    }

    #[test]
    fn summarized_until_defaults_to_zero() {
        let session = ConversationSession::new(SessionId::new(), None);
        assert_eq!(session.summarized_until(), 0);
    }

    #[test]
    fn idle_detection() {
        let mut session = ConversationSession::new(SessionId::new(), None);
        session.last_activity_at = Utc::now() - chrono::Duration::hours(2);
        assert!(session.idle_longer_than(chrono::Duration::hours(1), Utc::now()));
        assert!(!session.idle_longer_than(chrono::Duration::hours(3), Utc::now()));
    }

    #[test]
    fn language_codes_roundtrip() {
        for lang in [Language::En, Language::Zh, Language::Ms, Language::Ta] {
            assert_eq!(Language::from_code(lang.code()), Some(lang));
        }
        assert_eq!(Language::from_code("fr"), None);
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&SessionStatus::Escalated).unwrap();
        assert_eq!(json, "\"escalated\"");
    }
}
