//! The retriever — stage one (broad candidate fetch) and stage two
//! (optional rerank), producing a ranked, thresholded `RetrievalResult`.

use crabdesk_config::RetrievalConfig;
use crabdesk_core::chunk::{ChunkFilters, RetrievalResult};
use crabdesk_core::error::RetrievalError;
use crabdesk_core::knowledge::KnowledgeStore;
use crabdesk_core::provider::{EmbeddingProvider, Reranker};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::scoring;

/// Ranks knowledge-base chunks for a query. Read-only; no side effects.
pub struct Retriever {
    knowledge: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn Reranker>>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        knowledge: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Option<Arc<dyn Reranker>>,
        config: RetrievalConfig,
    ) -> Self {
        Self { knowledge, embedder, reranker, config }
    }

    /// Retrieve the top-`top_k` most relevant chunks for `query`.
    ///
    /// Dropping every candidate below the minimum score yields an *empty*
    /// result, not an error. A backend that cannot be reached is an error —
    /// it must never masquerade as "nothing relevant found".
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: &ChunkFilters,
    ) -> Result<RetrievalResult, RetrievalError> {
        if top_k == 0 || top_k > 200 {
            return Err(RetrievalError::InvalidRequest(format!(
                "top_k must be in 1..=200, got {top_k}"
            )));
        }

        let start = Instant::now();

        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| RetrievalError::Unavailable(format!("embedding provider: {e}")))?;

        // Stage one: broad candidate pool, an order of magnitude above the
        // final K.
        let pool_size = self.config.top_k_retrieval.max(top_k);

        let mut semantic = self
            .knowledge
            .similarity_search(&embedding, pool_size, filters)
            .await?;
        scoring::clamp_unit(&mut semantic);

        let candidates = if self.config.hybrid_alpha < 1.0 {
            let mut lexical = self.knowledge.lexical_search(query, pool_size, filters).await?;
            scoring::normalize_by_max(&mut lexical);
            scoring::blend_hybrid(semantic, lexical, self.config.hybrid_alpha)
        } else {
            scoring::sort_by_score_stable(semantic)
        };

        debug!(
            candidates = candidates.len(),
            pool_size,
            alpha = self.config.hybrid_alpha,
            "Candidate pool assembled"
        );

        // Stage two: optional rerank of the pool.
        let (mut ranked, reranking_applied) = match (&self.reranker, self.config.rerank_enabled) {
            (Some(reranker), true) if !candidates.is_empty() => {
                match reranker.rerank(query, candidates.clone()).await {
                    Ok(mut reranked) => {
                        scoring::clamp_unit(&mut reranked);
                        (scoring::sort_by_score_stable(reranked), true)
                    }
                    Err(e) => {
                        // Rerank is a refinement pass, not the grounding
                        // source — degrade to first-stage order.
                        warn!(error = %e, "Rerank failed, keeping first-stage order");
                        (candidates, false)
                    }
                }
            }
            _ => (candidates, false),
        };

        ranked.truncate(top_k);
        ranked.retain(|c| c.score >= self.config.min_score);

        let elapsed_ms = start.elapsed().as_millis() as u64;

        if ranked.is_empty() {
            debug!(query_len = query.len(), "No candidates above minimum score");
            let mut result = RetrievalResult::empty(query, elapsed_ms);
            result.reranking_applied = reranking_applied;
            return Ok(result);
        }

        Ok(RetrievalResult {
            chunks: ranked,
            query_used: query.to_string(),
            retrieval_time_ms: elapsed_ms,
            reranking_applied,
        })
    }
}
