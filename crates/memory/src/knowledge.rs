//! In-memory knowledge store.
//!
//! A small embedded index used by tests and the CLI demo. Semantic search
//! ranks by cosine similarity over stored embeddings; lexical search uses
//! term-frequency scoring. Production deployments point the retriever at an
//! external vector database implementing the same trait.

use async_trait::async_trait;
use crabdesk_core::chunk::{ChunkFilters, DocumentChunk};
use crabdesk_core::error::RetrievalError;
use crabdesk_core::knowledge::KnowledgeStore;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// An in-memory chunk index.
pub struct InMemoryKnowledgeStore {
    chunks: Arc<RwLock<Vec<DocumentChunk>>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self {
            chunks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Index a chunk. Chunks are immutable once indexed.
    pub async fn index(&self, chunk: DocumentChunk) {
        self.chunks.write().await.push(chunk);
    }

    /// Index a batch of chunks.
    pub async fn index_all(&self, chunks: impl IntoIterator<Item = DocumentChunk>) {
        self.chunks.write().await.extend(chunks);
    }

    /// Remove a document and all chunks derived from it.
    ///
    /// Returns the number of chunks removed.
    pub async fn remove_source(&self, source: &str) -> usize {
        let mut chunks = self.chunks.write().await;
        let before = chunks.len();
        chunks.retain(|c| c.source != source);
        let removed = before - chunks.len();
        debug!(source, removed, "Removed document from index");
        removed
    }

    /// Term-frequency score for lexical search, normalized by content length.
    fn keyword_score(content: &str, terms: &[String]) -> f32 {
        if terms.is_empty() {
            return 0.0;
        }
        let content_lower = content.to_lowercase();
        let hits: usize = terms.iter().map(|t| content_lower.matches(t.as_str()).count()).sum();
        hits as f32 / (content.len() as f32 / 100.0).max(1.0)
    }
}

impl Default for InMemoryKnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn similarity_search(
        &self,
        embedding: &[f32],
        pool_size: usize,
        filters: &ChunkFilters,
    ) -> Result<Vec<DocumentChunk>, RetrievalError> {
        let chunks = self.chunks.read().await;

        let mut scored: Vec<DocumentChunk> = chunks
            .iter()
            .filter(|c| filters.matches(c))
            .filter_map(|c| {
                let emb = c.embedding.as_ref()?;
                let mut chunk = c.clone();
                chunk.score = crate::vector::cosine_similarity(emb, embedding);
                Some(chunk)
            })
            .collect();

        // Stable sort: equal scores keep index order.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(pool_size);
        Ok(scored)
    }

    async fn lexical_search(
        &self,
        query: &str,
        pool_size: usize,
        filters: &ChunkFilters,
    ) -> Result<Vec<DocumentChunk>, RetrievalError> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .filter(|w| w.len() > 1)
            .map(String::from)
            .collect();

        let chunks = self.chunks.read().await;

        let mut scored: Vec<DocumentChunk> = chunks
            .iter()
            .filter(|c| filters.matches(c))
            .filter_map(|c| {
                let score = Self::keyword_score(&c.content, &terms);
                if score > 0.0 {
                    let mut chunk = c.clone();
                    chunk.score = score;
                    Some(chunk)
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(pool_size);
        Ok(scored)
    }

    async fn count(&self) -> Result<usize, RetrievalError> {
        Ok(self.chunks.read().await.len())
    }
}
