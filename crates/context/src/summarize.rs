//! Rolling-summary planning.
//!
//! Decides *when* a summary refresh is needed and *which* span it must
//! cover; the engine owns the actual (async) summarizer call. Planning is
//! idempotent: a span already covered by the current watermark yields no
//! work, so re-planning after a refresh is a no-op.

use crabdesk_config::ContextConfig;
use crabdesk_core::session::{ConversationSession, RollingSummary};
use crabdesk_core::provider::SummaryOutput;
use chrono::Utc;

/// A span of messages the summarizer should fold into the rolling summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarySpan {
    /// First message index not yet covered (current watermark).
    pub start: usize,
    /// One past the last message to cover.
    pub end: usize,
}

/// Plans rolling-summary refreshes.
pub struct SummaryPlanner {
    config: ContextConfig,
}

impl SummaryPlanner {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Whether the session needs a summary refresh, and for which span.
    ///
    /// Triggers once the message count exceeds `summarization_threshold`.
    /// The recent window (`max_conversation_messages`) always stays raw;
    /// everything older that the watermark does not yet cover is folded in.
    pub fn plan(&self, session: &ConversationSession) -> Option<SummarySpan> {
        if session.messages.len() <= self.config.summarization_threshold {
            return None;
        }

        let keep_raw = self.config.max_conversation_messages.min(session.messages.len());
        let end = session.messages.len() - keep_raw;
        let start = session.summarized_until();

        if end <= start {
            // Already fully summarized up to the recent window — no-op.
            return None;
        }

        Some(SummarySpan { start, end })
    }

    /// Fold a summarizer's output into the session's rolling summary.
    pub fn apply(span: &SummarySpan, output: SummaryOutput) -> RollingSummary {
        RollingSummary {
            text: output.summary,
            key_topics: output.key_topics,
            action_items: output.action_items,
            covers_messages: span.end,
            token_count: output.token_count,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crabdesk_core::message::{Message, SessionId};

    fn config(threshold: usize, window: usize) -> ContextConfig {
        ContextConfig {
            summarization_threshold: threshold,
            max_conversation_messages: window,
            ..ContextConfig::default()
        }
    }

    fn session(n: usize, covered: usize) -> ConversationSession {
        let mut session = ConversationSession::new(SessionId::from("s"), None);
        for i in 0..n {
            session.push(Message::user(format!("m{i}")));
        }
        if covered > 0 {
            session.summary = Some(RollingSummary {
                text: "earlier conversation".into(),
                key_topics: vec![],
                action_items: vec![],
                covers_messages: covered,
                token_count: 5,
                updated_at: Utc::now(),
            });
        }
        session
    }

    #[test]
    fn no_plan_below_threshold() {
        let planner = SummaryPlanner::new(config(15, 10));
        assert_eq!(planner.plan(&session(15, 0)), None);
        assert_eq!(planner.plan(&session(3, 0)), None);
    }

    #[test]
    fn plan_covers_everything_outside_recent_window() {
        let planner = SummaryPlanner::new(config(15, 10));
        let span = planner.plan(&session(20, 0)).unwrap();
        assert_eq!(span, SummarySpan { start: 0, end: 10 });
    }

    #[test]
    fn plan_resumes_from_watermark() {
        let planner = SummaryPlanner::new(config(15, 10));
        let span = planner.plan(&session(30, 10)).unwrap();
        assert_eq!(span, SummarySpan { start: 10, end: 20 });
    }

    #[test]
    fn already_covered_span_is_noop() {
        let planner = SummaryPlanner::new(config(15, 10));
        // 20 messages, 10 raw window, watermark already at 10.
        assert_eq!(planner.plan(&session(20, 10)), None);
        // Watermark beyond the boundary is also a no-op.
        assert_eq!(planner.plan(&session(20, 12)), None);
    }

    #[test]
    fn apply_sets_watermark_to_span_end() {
        let span = SummarySpan { start: 0, end: 12 };
        let summary = SummaryPlanner::apply(
            &span,
            SummaryOutput {
                summary: "they discussed shipping".into(),
                key_topics: vec!["shipping".into()],
                action_items: vec!["send tracking link".into()],
                token_count: 8,
            },
        );
        assert_eq!(summary.covers_messages, 12);
        assert_eq!(summary.text, "they discussed shipping");
        assert_eq!(summary.key_topics, vec!["shipping".to_string()]);
    }
}
