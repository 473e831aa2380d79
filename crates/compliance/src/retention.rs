//! PDPA retention policy.
//!
//! Customer conversation data may only be kept for the configured window
//! after the last activity. Past that, sessions are deleted outright —
//! retention means deletion, never an archive flag.

use chrono::{DateTime, Duration, Utc};
use crabdesk_config::ComplianceConfig;
use crabdesk_core::error::MemoryError;
use crabdesk_core::event::{DomainEvent, EventBus};
use crabdesk_core::memory::SessionStore;
use crabdesk_core::session::ConversationSession;
use std::sync::Arc;
use tracing::info;

/// Retention window derived from compliance configuration.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    retention: Duration,
}

impl RetentionPolicy {
    pub fn new(config: &ComplianceConfig) -> Self {
        Self { retention: Duration::days(config.data_retention_days as i64) }
    }

    pub fn from_days(days: i64) -> Self {
        Self { retention: Duration::days(days) }
    }

    /// The maximum idle duration before a session expires.
    pub fn max_idle(&self) -> Duration {
        self.retention
    }

    /// When the session's data must be gone, given its current activity.
    pub fn expires_at(&self, session: &ConversationSession) -> DateTime<Utc> {
        session.last_activity_at + self.retention
    }

    /// Whether the session has outlived the retention window.
    pub fn is_expired(&self, session: &ConversationSession, now: DateTime<Utc>) -> bool {
        session.idle_longer_than(self.retention, now)
    }

    /// Purge everything past the retention window from `store`.
    pub async fn enforce(
        &self,
        store: &dyn SessionStore,
        events: &Arc<EventBus>,
    ) -> Result<usize, MemoryError> {
        let purged = store.purge_expired(self.retention).await?;
        if purged > 0 {
            info!(purged, retention_days = self.retention.num_days(), "Retention enforced");
            events.publish(DomainEvent::SessionsPurged { count: purged, timestamp: Utc::now() });
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crabdesk_core::message::SessionId;

    fn session_idle_for(days: i64) -> ConversationSession {
        let mut session = ConversationSession::new(SessionId::from("s"), None);
        session.last_activity_at = Utc::now() - Duration::days(days);
        session
    }

    #[test]
    fn fresh_session_not_expired() {
        let policy = RetentionPolicy::from_days(30);
        assert!(!policy.is_expired(&session_idle_for(0), Utc::now()));
        assert!(!policy.is_expired(&session_idle_for(29), Utc::now()));
    }

    #[test]
    fn idle_session_expired() {
        let policy = RetentionPolicy::from_days(30);
        assert!(policy.is_expired(&session_idle_for(31), Utc::now()));
    }

    #[test]
    fn policy_from_config() {
        let config = ComplianceConfig { data_retention_days: 7, ..Default::default() };
        let policy = RetentionPolicy::new(&config);
        assert_eq!(policy.max_idle(), Duration::days(7));
    }

    #[test]
    fn expires_at_is_activity_plus_window() {
        let policy = RetentionPolicy::from_days(30);
        let session = session_idle_for(10);
        let expected = session.last_activity_at + Duration::days(30);
        assert_eq!(policy.expires_at(&session), expected);
    }
}
