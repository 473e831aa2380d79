//! # Crabdesk Core
//!
//! Domain types, traits, and error definitions for the crabdesk
//! retrieval-augmented support engine. This crate has **zero framework
//! dependencies** — it defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (knowledge store, embedding provider,
//! reranker, language model, summarizer, session store, ticket sink) is
//! defined as a trait here. Implementations live in their respective
//! crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub collaborators
//! - Clean dependency graph (all crates depend inward on core)

pub mod budget;
pub mod chunk;
pub mod error;
pub mod event;
pub mod knowledge;
pub mod memory;
pub mod message;
pub mod profile;
pub mod provider;
pub mod response;
pub mod session;
pub mod ticket;

// Re-export key types at crate root for ergonomics
pub use budget::TokenBudget;
pub use chunk::{ChunkFilters, DocumentChunk, RetrievalResult};
pub use error::{Error, MemoryError, ProviderError, Result, RetrievalError, TicketError};
pub use event::{DomainEvent, EventBus};
pub use knowledge::KnowledgeStore;
pub use memory::{SessionStore, TurnUpdate};
pub use message::{Message, Role, SessionId};
pub use profile::CustomerProfile;
pub use provider::{
    EmbeddingProvider, Generation, GenerationRequest, LanguageModel, Reranker, Summarizer,
    SummaryOutput, TextChunk, TokenUsage,
};
pub use response::{
    AgentResponse, EscalationReason, EscalationRecord, SourceCitation, SuggestedAction,
    TicketPriority,
};
pub use session::{ConversationSession, Intent, Language, RollingSummary, SessionStatus};
pub use ticket::TicketSink;
