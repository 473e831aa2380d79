//! Escalation record construction and customer-facing handoff text.
//!
//! The engine builds the record; tracking its resolution is the ticketing
//! system's job. Internal error detail never reaches the customer — they
//! get the generic apology and an acknowledgment that a human will follow
//! up.

use chrono::Utc;
use crabdesk_config::BusinessConfig;
use crabdesk_core::message::Role;
use crabdesk_core::response::{EscalationReason, EscalationRecord};
use crabdesk_core::session::ConversationSession;

/// Build the escalation record for a session.
///
/// The description prefers the rolling summary; without one it falls back
/// to a gist of the most recent customer messages.
pub fn build_record(
    session: &ConversationSession,
    reason: EscalationReason,
    pending_user_message: &str,
) -> EscalationRecord {
    let subject = format!("Escalated: {}", reason_summary(reason));

    let description = match &session.summary {
        Some(summary) => summary.text.clone(),
        None => {
            let mut recent: Vec<&str> = session
                .messages
                .iter()
                .rev()
                .filter(|m| m.role == Role::User)
                .take(2)
                .map(|m| m.content.as_str())
                .collect();
            recent.reverse();
            recent.push(pending_user_message);
            format!("Recent customer messages: {}", recent.join(" | "))
        }
    };

    EscalationRecord {
        ticket_number: EscalationRecord::ticket_number(),
        subject,
        description,
        priority: reason.priority(),
        reason,
        session_id: session.id.clone(),
        customer_id: session.customer_id.clone(),
        created_at: Utc::now(),
    }
}

fn reason_summary(reason: EscalationReason) -> &'static str {
    match reason {
        EscalationReason::LowConfidence => "agent could not answer confidently",
        EscalationReason::NegativeSentiment => "customer frustration detected",
        EscalationReason::ExplicitRequest => "customer requested a human",
        EscalationReason::SensitiveTopic => "sensitive topic raised",
        EscalationReason::RepeatedFailure => "automated response unavailable",
    }
}

/// The customer-facing handoff message.
///
/// Always apologetic, never technical. Mentions business hours so the
/// customer knows when to expect the follow-up.
pub fn handoff_message(business: &BusinessConfig, reason: EscalationReason) -> String {
    let opening = match reason {
        EscalationReason::ExplicitRequest => {
            "Of course — I've passed your conversation to our support team.".to_string()
        }
        EscalationReason::RepeatedFailure => {
            "I'm sorry, I'm having trouble responding right now. I've passed your conversation to our support team.".to_string()
        }
        _ => {
            "I'm sorry I couldn't resolve this for you directly. I've passed your conversation to our support team.".to_string()
        }
    };

    format!(
        "{opening} A colleague will follow up during business hours ({}–{} {}, {}). \
         You can also reach us at {}.",
        business.hours_start,
        business.hours_end,
        business.timezone,
        business.days.replace(',', ", "),
        business.support_email
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crabdesk_core::message::{Message, SessionId};
    use crabdesk_core::response::TicketPriority;
    use crabdesk_core::session::RollingSummary;

    fn session() -> ConversationSession {
        ConversationSession::new(SessionId::from("sess_esc"), Some("cust_1".into()))
    }

    #[test]
    fn record_prefers_summary_for_description() {
        let mut s = session();
        s.summary = Some(RollingSummary {
            text: "Customer has an undelivered order from last week.".into(),
            key_topics: vec![],
            action_items: vec![],
            covers_messages: 4,
            token_count: 10,
            updated_at: Utc::now(),
        });

        let record = build_record(&s, EscalationReason::NegativeSentiment, "still nothing!");
        assert_eq!(record.description, "Customer has an undelivered order from last week.");
        assert_eq!(record.priority, TicketPriority::High);
        assert_eq!(record.session_id, SessionId::from("sess_esc"));
        assert_eq!(record.customer_id.as_deref(), Some("cust_1"));
    }

    #[test]
    fn record_falls_back_to_recent_messages() {
        let mut s = session();
        s.push(Message::user("My order is late"));
        s.push(Message::assistant("Let me check."));
        s.push(Message::user("It's been two weeks"));

        let record = build_record(&s, EscalationReason::ExplicitRequest, "get me a person");
        assert!(record.description.contains("My order is late"));
        assert!(record.description.contains("It's been two weeks"));
        assert!(record.description.contains("get me a person"));
        assert_eq!(record.priority, TicketPriority::Medium);
    }

    #[test]
    fn subject_names_the_reason() {
        let record = build_record(&session(), EscalationReason::SensitiveTopic, "x");
        assert!(record.subject.contains("sensitive topic"));
        assert!(record.ticket_number.starts_with("TKT-"));
    }

    #[test]
    fn handoff_message_mentions_hours_and_contact() {
        let business = BusinessConfig::default();
        let text = handoff_message(&business, EscalationReason::LowConfidence);
        assert!(text.contains("09:00"));
        assert!(text.contains("18:00"));
        assert!(text.contains(&business.support_email));
        assert!(text.to_lowercase().contains("sorry"));
    }

    #[test]
    fn handoff_for_explicit_request_is_not_apologetic() {
        let business = BusinessConfig::default();
        let text = handoff_message(&business, EscalationReason::ExplicitRequest);
        assert!(text.starts_with("Of course"));
    }

    #[test]
    fn handoff_never_leaks_error_detail() {
        let business = BusinessConfig::default();
        let text = handoff_message(&business, EscalationReason::RepeatedFailure);
        for needle in ["timeout", "retry", "provider", "error:", "500"] {
            assert!(!text.to_lowercase().contains(needle));
        }
    }
}
