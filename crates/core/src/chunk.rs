//! Knowledge-base chunks and retrieval results.
//!
//! A `DocumentChunk` is an immutable unit of indexed knowledge, produced
//! once at ingestion and never mutated. Its `score` field is populated only
//! at query time and is never stored. A `RetrievalResult` is ephemeral:
//! owned by the call that produced it, consumed by the context assembler,
//! then discarded.

use serde::{Deserialize, Serialize};

use crate::session::Language;

/// An immutable unit of indexed knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Unique chunk identifier
    pub id: String,

    /// Human-readable source label (document name, URL, etc.)
    pub source: String,

    /// Content category (faq, product, policy, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Language tag of the chunk content
    #[serde(default)]
    pub language: Language,

    /// The text content of this chunk
    pub content: String,

    /// Embedding vector (present when loaded from the index)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Relevance score in [0, 1], set per query — never persisted
    #[serde(default)]
    pub score: f32,
}

impl DocumentChunk {
    /// A short snippet of the content for citations.
    pub fn snippet(&self, max_chars: usize) -> String {
        if self.content.len() <= max_chars {
            return self.content.clone();
        }
        // Cut on a char boundary, then trim to the last whole word.
        let mut cut = max_chars;
        while !self.content.is_char_boundary(cut) {
            cut -= 1;
        }
        let prefix = &self.content[..cut];
        let trimmed = match prefix.rfind(char::is_whitespace) {
            Some(pos) if pos > 0 => &prefix[..pos],
            _ => prefix,
        };
        format!("{trimmed}…")
    }
}

/// Filters applied during candidate retrieval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkFilters {
    /// Restrict to a category (faq, product, policy, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Restrict to a language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
}

impl ChunkFilters {
    pub fn matches(&self, chunk: &DocumentChunk) -> bool {
        if let Some(cat) = &self.category {
            if chunk.category.as_deref() != Some(cat.as_str()) {
                return false;
            }
        }
        if let Some(lang) = &self.language {
            if chunk.language != *lang {
                return false;
            }
        }
        true
    }
}

/// Ephemeral result of one retrieval pass.
///
/// Chunks are ordered by score descending; ties keep candidate-pool order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Ranked chunks, score descending
    pub chunks: Vec<DocumentChunk>,

    /// The (normalized) query text used
    pub query_used: String,

    /// Wall-clock time of the retrieval pass
    pub retrieval_time_ms: u64,

    /// Whether the reranking pass was applied
    pub reranking_applied: bool,
}

impl RetrievalResult {
    /// An empty result (all candidates below threshold, or empty index).
    pub fn empty(query: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            chunks: Vec::new(),
            query_used: query.into(),
            retrieval_time_ms: elapsed_ms,
            reranking_applied: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Highest-scored chunk, if any.
    pub fn top_chunk(&self) -> Option<&DocumentChunk> {
        self.chunks.first()
    }

    /// Mean score across retrieved chunks (0.0 when empty).
    pub fn average_score(&self) -> f32 {
        if self.chunks.is_empty() {
            return 0.0;
        }
        self.chunks.iter().map(|c| c.score).sum::<f32>() / self.chunks.len() as f32
    }
}
