//! In-memory ticket sink — for tests and local demos.

use async_trait::async_trait;
use crabdesk_core::error::TicketError;
use crabdesk_core::response::EscalationRecord;
use crabdesk_core::ticket::TicketSink;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Collects escalation records instead of delivering them anywhere.
pub struct InMemoryTicketSink {
    tickets: Arc<RwLock<Vec<EscalationRecord>>>,
}

impl InMemoryTicketSink {
    pub fn new() -> Self {
        Self { tickets: Arc::new(RwLock::new(Vec::new())) }
    }

    /// All records received so far.
    pub async fn tickets(&self) -> Vec<EscalationRecord> {
        self.tickets.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.tickets.read().await.len()
    }
}

impl Default for InMemoryTicketSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TicketSink for InMemoryTicketSink {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_ticket(&self, record: &EscalationRecord) -> Result<String, TicketError> {
        let id = record.ticket_number.clone();
        self.tickets.write().await.push(record.clone());
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crabdesk_core::message::SessionId;
    use crabdesk_core::response::{EscalationReason, TicketPriority};

    fn record() -> EscalationRecord {
        EscalationRecord {
            ticket_number: EscalationRecord::ticket_number(),
            subject: "Escalated: negative sentiment".into(),
            description: "Customer unhappy about delayed order.".into(),
            priority: TicketPriority::High,
            reason: EscalationReason::NegativeSentiment,
            session_id: SessionId::from("sess_1"),
            customer_id: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn stores_and_returns_ticket_id() {
        let sink = InMemoryTicketSink::new();
        let record = record();
        let id = sink.create_ticket(&record).await.unwrap();
        assert_eq!(id, record.ticket_number);
        assert_eq!(sink.count().await, 1);
        assert_eq!(sink.tickets().await[0].subject, record.subject);
    }
}
