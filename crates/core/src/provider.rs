//! Provider traits — abstractions over the model-serving backends.
//!
//! The engine talks to four external model services: a language model for
//! generation, an embedding provider for query vectors, a reranker for the
//! second-pass relevance ordering, and a summarizer for rolling history
//! compression. Each is a trait so tests can substitute deterministic mocks
//! and deployments can mix vendors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chunk::DocumentChunk;
use crate::error::ProviderError;
use crate::message::Message;

/// A fully-assembled generation request.
///
/// Generation must be retry-safe: invoking twice with the same request is
/// expected to be side-effect free on the provider side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The model to use (e.g., "gpt-4o-mini")
    pub model: String,

    /// System/business instructions
    pub system: String,

    /// Conversation messages (history window + current user message)
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

fn default_temperature() -> f32 {
    0.3
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete (non-streaming) generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    /// The generated text
    pub text: String,

    /// Self-reported confidence in [0, 1], when the provider exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_confidence: Option<f32>,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// A single chunk in a streaming generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: String,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only on the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// The language-model backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Generate a complete response.
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<Generation, ProviderError>;

    /// Generate a stream of text chunks.
    ///
    /// Default implementation calls `generate()` and wraps the result as a
    /// single chunk.
    async fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<TextChunk, ProviderError>>,
        ProviderError,
    > {
        let generation = self.generate(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(TextChunk {
                content: generation.text,
                done: true,
                usage: generation.usage,
            }))
            .await;
        Ok(rx)
    }

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

/// The embedding backend used for query vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Embed a single text into a dense vector.
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError>;

    /// Embedding dimensionality.
    fn dimensions(&self) -> usize;
}

/// Second-pass relevance model (cross-encoder style).
#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    /// Reorder `candidates` by relevance to `query`, updating scores.
    ///
    /// Returned scores are backend-native; the retriever re-normalizes.
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<DocumentChunk>,
    ) -> std::result::Result<Vec<DocumentChunk>, ProviderError>;
}

/// Output of a summarization call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryOutput {
    /// Condensed summary text
    pub summary: String,

    /// Key topics covered by the summarized span
    #[serde(default)]
    pub key_topics: Vec<String>,

    /// Outstanding action items
    #[serde(default)]
    pub action_items: Vec<String>,

    /// Token count of `summary`
    pub token_count: usize,
}

/// Rolling-summary backend.
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    /// Summarize a span of conversation messages.
    async fn summarize(
        &self,
        messages: &[Message],
        max_tokens: usize,
    ) -> std::result::Result<SummaryOutput, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoModel;

    #[async_trait]
    impl LanguageModel for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> std::result::Result<Generation, ProviderError> {
            Ok(Generation {
                text: request.messages.last().map(|m| m.content.clone()).unwrap_or_default(),
                self_confidence: Some(0.9),
                model: "echo-1".into(),
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn default_stream_wraps_single_chunk() {
        let model = EchoModel;
        let request = GenerationRequest {
            model: "echo-1".into(),
            system: String::new(),
            messages: vec![Message::user("hello")],
            temperature: 0.0,
            max_tokens: None,
            stop: vec![],
        };

        let mut rx = model.generate_stream(request).await.unwrap();
        let chunk = rx.recv().await.unwrap().unwrap();
        assert_eq!(chunk.content, "hello");
        assert!(chunk.done);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn generation_request_serialization() {
        let request = GenerationRequest {
            model: "gpt-4o-mini".into(),
            system: "You are a support agent.".into(),
            messages: vec![],
            temperature: 0.3,
            max_tokens: Some(1024),
            stop: vec![],
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("gpt-4o-mini"));
        assert!(json.contains("support agent"));
    }
}
