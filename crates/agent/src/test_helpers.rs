//! Shared mock collaborators for agent tests.

use async_trait::async_trait;
use crabdesk_core::chunk::{ChunkFilters, DocumentChunk};
use crabdesk_core::error::{ProviderError, RetrievalError};
use crabdesk_core::knowledge::KnowledgeStore;
use crabdesk_core::message::Message;
use crabdesk_core::provider::{
    EmbeddingProvider, Generation, GenerationRequest, LanguageModel, Summarizer, SummaryOutput,
};
use std::sync::Mutex;

/// A language model that replays scripted generations, then repeats the
/// last one. An empty script means every call fails with the given error.
pub struct ScriptedModel {
    script: Mutex<Vec<Result<Generation, ProviderError>>>,
    pub calls: Mutex<u32>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Result<Generation, ProviderError>>) -> Self {
        Self { script: Mutex::new(script), calls: Mutex::new(0) }
    }

    /// A model that always answers `text` with the given self-confidence.
    pub fn answering(text: &str, self_confidence: Option<f32>) -> Self {
        Self::new(vec![Ok(Generation {
            text: text.into(),
            self_confidence,
            model: "scripted-1".into(),
            usage: None,
        })])
    }

    /// A model that always fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        _request: GenerationRequest,
    ) -> std::result::Result<Generation, ProviderError> {
        *self.calls.lock().unwrap() += 1;
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            return Err(ProviderError::NotConfigured("empty script".into()));
        }
        if script.len() > 1 {
            script.remove(0)
        } else {
            script[0].clone()
        }
    }
}

/// Deterministic embedder: a fixed two-dimensional vector per text hash,
/// or a constant when constructed with `constant`.
pub struct StubEmbedder {
    vector: Vec<f32>,
}

impl StubEmbedder {
    pub fn constant(vector: Vec<f32>) -> Self {
        Self { vector }
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    fn name(&self) -> &str {
        "stub"
    }

    async fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        Ok(self.vector.clone())
    }

    fn dimensions(&self) -> usize {
        self.vector.len()
    }
}

/// Summarizer returning a canned summary, or failing when `fail` is set.
pub struct StubSummarizer {
    pub fail: bool,
}

#[async_trait]
impl Summarizer for StubSummarizer {
    fn name(&self) -> &str {
        "stub"
    }

    async fn summarize(
        &self,
        messages: &[Message],
        _max_tokens: usize,
    ) -> std::result::Result<SummaryOutput, ProviderError> {
        if self.fail {
            return Err(ProviderError::Timeout("summarizer down".into()));
        }
        Ok(SummaryOutput {
            summary: format!("Summary of {} messages.", messages.len()),
            key_topics: vec!["support".into()],
            action_items: vec![],
            token_count: 8,
        })
    }
}

/// A model that answers after a fixed delay (for timeout/serialization
/// tests).
pub struct DelayedModel {
    pub delay: std::time::Duration,
    pub text: String,
    pub self_confidence: Option<f32>,
}

#[async_trait]
impl LanguageModel for DelayedModel {
    fn name(&self) -> &str {
        "delayed"
    }

    async fn generate(
        &self,
        _request: GenerationRequest,
    ) -> std::result::Result<Generation, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok(Generation {
            text: self.text.clone(),
            self_confidence: self.self_confidence,
            model: "delayed-1".into(),
            usage: None,
        })
    }
}

/// Knowledge store whose backend is unreachable.
pub struct UnavailableKnowledge;

#[async_trait]
impl KnowledgeStore for UnavailableKnowledge {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn similarity_search(
        &self,
        _embedding: &[f32],
        _pool_size: usize,
        _filters: &ChunkFilters,
    ) -> Result<Vec<DocumentChunk>, RetrievalError> {
        Err(RetrievalError::Unavailable("vector backend unreachable".into()))
    }

    async fn lexical_search(
        &self,
        _query: &str,
        _pool_size: usize,
        _filters: &ChunkFilters,
    ) -> Result<Vec<DocumentChunk>, RetrievalError> {
        Err(RetrievalError::Unavailable("vector backend unreachable".into()))
    }

    async fn count(&self) -> Result<usize, RetrievalError> {
        Err(RetrievalError::Unavailable("vector backend unreachable".into()))
    }
}
