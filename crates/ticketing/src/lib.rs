//! Ticket sink implementations.
//!
//! The engine hands a constructed `EscalationRecord` to a `TicketSink`;
//! everything after that (assignment, resolution, SLAs) belongs to the
//! external ticketing system.

pub mod in_memory;
pub mod webhook;

pub use in_memory::InMemoryTicketSink;
pub use webhook::{WebhookTicketSink, WebhookTicketConfig};
