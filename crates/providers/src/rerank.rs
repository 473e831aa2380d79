//! Cohere-style rerank client.
//!
//! Second-pass relevance reordering via a hosted cross-encoder. The wire
//! format follows Cohere's `/rerank` endpoint: documents go in by index,
//! results come back as `(index, relevance_score)` pairs.

use async_trait::async_trait;
use crabdesk_core::chunk::DocumentChunk;
use crabdesk_core::error::ProviderError;
use crabdesk_core::provider::Reranker;
use serde::Deserialize;
use tracing::{debug, warn};

/// A reranker backed by a Cohere-compatible `/rerank` endpoint.
pub struct CohereReranker {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl CohereReranker {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_base_url("https://api.cohere.com/v1", api_key, model)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }

    /// Apply a rerank response to the candidate list.
    ///
    /// Results reference candidates by index; entries the backend omitted
    /// are dropped. Out-of-range indexes are ignored rather than trusted.
    fn apply_results(
        mut candidates: Vec<DocumentChunk>,
        results: &[RerankResult],
    ) -> Vec<DocumentChunk> {
        let mut taken: Vec<Option<DocumentChunk>> =
            candidates.drain(..).map(Some).collect();

        results
            .iter()
            .filter_map(|r| {
                let slot = taken.get_mut(r.index)?;
                let mut chunk = slot.take()?;
                chunk.score = r.relevance_score;
                Some(chunk)
            })
            .collect()
    }
}

#[async_trait]
impl Reranker for CohereReranker {
    fn name(&self) -> &str {
        "cohere"
    }

    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<DocumentChunk>,
    ) -> std::result::Result<Vec<DocumentChunk>, ProviderError> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let url = format!("{}/rerank", self.base_url);
        let documents: Vec<&str> = candidates.iter().map(|c| c.content.as_str()).collect();

        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": documents,
            "top_n": documents.len(),
        });

        debug!(candidates = candidates.len(), model = %self.model, "Sending rerank request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited { retry_after_secs: 5 });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed("Invalid rerank API key".into()));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Rerank endpoint returned error");
            return Err(ProviderError::ApiError { status_code: status, message: error_body });
        }

        let api_response: RerankResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("rerank: {e}")))?;

        Ok(Self::apply_results(candidates, &api_response.results))
    }
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Debug, Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}
