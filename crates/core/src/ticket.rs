//! Ticket sink trait — the external ticketing collaborator.
//!
//! The engine constructs an [`EscalationRecord`](crate::EscalationRecord)
//! and hands it off; ticket resolution is tracked entirely by the external
//! system.

use async_trait::async_trait;

use crate::error::TicketError;
use crate::response::EscalationRecord;

/// Destination for escalation records.
#[async_trait]
pub trait TicketSink: Send + Sync {
    /// The sink name (e.g., "webhook", "in_memory").
    fn name(&self) -> &str;

    /// Create a ticket from an escalation record.
    ///
    /// Returns the external ticket id.
    async fn create_ticket(&self, record: &EscalationRecord) -> Result<String, TicketError>;
}
