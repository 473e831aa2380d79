//! Agent responses, citations, and escalation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::SessionId;
use crate::provider::TokenUsage;
use crate::session::{Intent, Language};

/// Citation for a knowledge chunk used in a response.
///
/// The citation list of a non-escalated response must be a subset of the
/// chunks the context assembler actually selected for that turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    /// Cited chunk id
    pub chunk_id: String,

    /// Relevance score from retrieval, in [0, 1]
    pub relevance_score: f32,

    /// Short text snippet from the chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// A suggested follow-up action for the customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedAction {
    /// Action kind: link, button, quick_reply
    pub action_type: String,

    /// Display label
    pub label: String,

    /// Action value (URL, intent name, canned reply, ...)
    pub value: String,
}

/// Why a conversation was escalated to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// Confidence fell below the ambiguous band
    LowConfidence,
    /// Session sentiment breached the escalation threshold
    NegativeSentiment,
    /// The customer explicitly asked for a human
    ExplicitRequest,
    /// The message matched the sensitive-topic filter
    SensitiveTopic,
    /// Provider failures exhausted the retry budget (or the turn timed out)
    RepeatedFailure,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowConfidence => "low_confidence",
            Self::NegativeSentiment => "negative_sentiment",
            Self::ExplicitRequest => "explicit_request",
            Self::SensitiveTopic => "sensitive_topic",
            Self::RepeatedFailure => "repeated_failure",
        }
    }

    /// Ticket priority implied by this reason's severity.
    pub fn priority(&self) -> TicketPriority {
        match self {
            Self::NegativeSentiment | Self::SensitiveTopic | Self::RepeatedFailure => {
                TicketPriority::High
            }
            Self::ExplicitRequest => TicketPriority::Medium,
            Self::LowConfidence => TicketPriority::Low,
        }
    }
}

/// Ticket priority for the external ticketing collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// The outcome of one turn, appended to the session as an assistant message.
///
/// Immutable after creation; later user feedback is linked by `message_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Unique message identifier
    pub message_id: Uuid,

    /// Session this turn belongs to
    pub session_id: SessionId,

    /// Response text shown to the customer
    pub content: String,

    /// Confidence in [0, 1]
    pub confidence: f32,

    /// Sources used to ground the response
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceCitation>,

    /// Suggested follow-up actions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<SuggestedAction>,

    /// Quick reply suggestions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quick_replies: Vec<String>,

    /// Whether this turn is a clarifying question awaiting user follow-up
    #[serde(default)]
    pub requires_followup: bool,

    /// Whether the conversation was escalated to a human
    #[serde(default)]
    pub escalated: bool,

    /// Why, when escalated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<EscalationReason>,

    /// Detected language of the user message
    #[serde(default)]
    pub detected_language: Language,

    /// Detected user intent
    #[serde(default)]
    pub detected_intent: Intent,

    /// End-to-end turn processing time
    pub processing_time_ms: u64,

    /// Which model produced the draft (empty for synthesized escalations)
    #[serde(default)]
    pub model_used: String,

    /// Token usage for the generation call, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,

    /// Response timestamp (UTC)
    pub timestamp: DateTime<Utc>,
}

/// Record handed to the ticketing collaborator when a turn escalates.
///
/// The engine only constructs this; ticket lifecycle belongs to the
/// external system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRecord {
    /// Ticket number, e.g. `TKT-1A2B3C4D`
    pub ticket_number: String,

    /// Short subject derived from the escalation reason
    pub subject: String,

    /// Description derived from the conversation summary
    pub description: String,

    /// Priority derived from reason severity
    pub priority: TicketPriority,

    /// The taxonomy reason
    pub reason: EscalationReason,

    /// Back-reference to the originating session
    pub session_id: SessionId,

    /// Customer reference, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,

    /// When the record was constructed
    pub created_at: DateTime<Utc>,
}

impl EscalationRecord {
    /// Generate a ticket number in the `TKT-XXXXXXXX` format.
    pub fn ticket_number() -> String {
        let hex = Uuid::new_v4().simple().to_string();
        format!("TKT-{}", hex[..8].to_uppercase())
    }
}
