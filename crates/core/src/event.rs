//! Domain event system — decoupled communication between bounded contexts.
//!
//! Events are published when something interesting happens in the engine.
//! Subscribers (audit logging, the CLI, future metrics) react without tight
//! coupling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A retrieval pass finished
    RetrievalCompleted {
        session_id: String,
        chunks: usize,
        reranking_applied: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A turn finished (responded, clarified, or escalated)
    TurnCompleted {
        session_id: String,
        confidence: f32,
        escalated: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A session was handed to a human
    SessionEscalated {
        session_id: String,
        reason: String,
        ticket_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// The rolling summary was refreshed
    SummaryRefreshed {
        session_id: String,
        covers_messages: usize,
        timestamp: DateTime<Utc>,
    },

    /// PII was detected and masked (PDPA audit trail — kinds only, never values)
    PiiDetected {
        session_id: String,
        kind: String,
        timestamp: DateTime<Utc>,
    },

    /// Expired sessions were purged
    SessionsPurged {
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Components
/// subscribe to receive all events and filter for what they care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
