//! Knowledge store trait — the read-only retrieval backend.
//!
//! Ingestion and mutation of the knowledge base belong to an external
//! collaborator; this engine only queries. Implementations: a vector
//! database client in production, an in-memory index for tests and demos.

use async_trait::async_trait;

use crate::chunk::{ChunkFilters, DocumentChunk};
use crate::error::RetrievalError;

/// Read-only access to the indexed knowledge base.
///
/// Both search methods return candidates with backend-native scores; the
/// retriever normalizes, blends, and thresholds them. A backend that cannot
/// be reached must fail with [`RetrievalError::Unavailable`] — never return
/// an empty list for an outage.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// The backend name (e.g., "qdrant", "in_memory").
    fn name(&self) -> &str;

    /// Dense similarity search over chunk embeddings.
    async fn similarity_search(
        &self,
        embedding: &[f32],
        pool_size: usize,
        filters: &ChunkFilters,
    ) -> Result<Vec<DocumentChunk>, RetrievalError>;

    /// Lexical/keyword search (for hybrid mode).
    async fn lexical_search(
        &self,
        query: &str,
        pool_size: usize,
        filters: &ChunkFilters,
    ) -> Result<Vec<DocumentChunk>, RetrievalError>;

    /// Number of indexed chunks.
    async fn count(&self) -> Result<usize, RetrievalError>;
}
