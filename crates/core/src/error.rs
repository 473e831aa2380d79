//! Error types for the crabdesk domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all crabdesk operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Retrieval errors ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Session store errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Ticketing errors ---
    #[error("Ticket error: {0}")]
    Ticket(#[from] TicketError),

    /// System instructions plus the reserved response window alone exceed
    /// the context budget. A configuration error — reject at startup, never
    /// silently truncate at turn time.
    #[error(
        "Infeasible token budget: {required} required tokens exceed max_context_tokens {max}"
    )]
    BudgetInfeasible { required: usize, max: usize },

    /// Another turn for the same session is in flight and the bounded wait
    /// expired. The caller should retry.
    #[error("Session {session_id} is busy (waited {waited_ms}ms)")]
    SessionBusy { session_id: String, waited_ms: u64 },

    /// A response attempted to cite a chunk outside the assembled context.
    /// Caught internally and converted into an escalation outcome.
    #[error("Grounding violation: citation references chunk {chunk_id} outside the assembled context")]
    GroundingViolation { chunk_id: String },

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    /// The embedding/vector backend cannot be reached. Must propagate to
    /// the caller — a silent empty result would let the arbiter answer
    /// ungrounded.
    #[error("Knowledge backend unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid retrieval request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether a retry with the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) | Self::RateLimited { .. } => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            Self::AuthenticationFailed(_) | Self::NotConfigured(_) | Self::InvalidResponse(_) => {
                false
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Session not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("Ticket sink not configured: {0}")]
    NotConfigured(String),

    #[error("Ticket delivery failed: {0}")]
    DeliveryFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieval_unavailable_displays_backend() {
        let err = Error::Retrieval(RetrievalError::Unavailable("qdrant: connection refused".into()));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn budget_infeasible_displays_both_numbers() {
        let err = Error::BudgetInfeasible { required: 5000, max: 4000 };
        let msg = err.to_string();
        assert!(msg.contains("5000"));
        assert!(msg.contains("4000"));
    }

    #[test]
    fn retryable_classification() {
        assert!(ProviderError::Timeout("30s".into()).is_retryable());
        assert!(ProviderError::ApiError { status_code: 503, message: "overloaded".into() }.is_retryable());
        assert!(!ProviderError::ApiError { status_code: 400, message: "bad request".into() }.is_retryable());
        assert!(!ProviderError::AuthenticationFailed("bad key".into()).is_retryable());
    }

    #[test]
    fn session_busy_displays_wait() {
        let err = Error::SessionBusy { session_id: "sess_1".into(), waited_ms: 30000 };
        assert!(err.to_string().contains("sess_1"));
        assert!(err.to_string().contains("30000"));
    }
}
