//! Turn-level streaming events.
//!
//! The streaming surface emits text chunks as they become available,
//! followed by a single `Completed` envelope carrying the full
//! `AgentResponse`. Transport layers forward these over SSE or WebSocket.

use crabdesk_core::response::AgentResponse;
use serde::{Deserialize, Serialize};

/// Events emitted by the engine during a streaming turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnStreamEvent {
    /// Partial response text.
    Chunk { content: String },

    /// The turn finished — the final response envelope.
    Completed { response: AgentResponse },

    /// The turn failed before producing a response.
    Error { message: String },
}

impl TurnStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::Completed { .. } => "completed",
            Self::Error { .. } => "error",
        }
    }
}
