//! LLM-backed conversation summarizer.
//!
//! Folds a span of conversation messages into a compact summary with key
//! topics and action items, by asking the underlying language model for a
//! JSON object. Parsing is tolerant: if the model wraps the JSON in prose
//! or returns plain text, the text is used as the summary verbatim.

use async_trait::async_trait;
use crabdesk_core::error::ProviderError;
use crabdesk_core::message::{Message, Role};
use crabdesk_core::provider::{GenerationRequest, LanguageModel, Summarizer, SummaryOutput};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// A summarizer implemented over any `LanguageModel`.
pub struct LlmSummarizer {
    model: Arc<dyn LanguageModel>,
    model_name: String,
}

impl LlmSummarizer {
    pub fn new(model: Arc<dyn LanguageModel>, model_name: impl Into<String>) -> Self {
        Self { model, model_name: model_name.into() }
    }

    fn render_transcript(messages: &[Message]) -> String {
        messages
            .iter()
            .map(|m| {
                let speaker = match m.role {
                    Role::User => "Customer",
                    Role::Assistant => "Agent",
                    Role::System => "Context",
                };
                format!("{speaker}: {}", m.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Extract the first JSON object from model output, tolerating prose
    /// around it. Falls back to treating the whole text as the summary.
    fn parse_output(text: &str) -> (String, Vec<String>, Vec<String>) {
        let candidate = match (text.find('{'), text.rfind('}')) {
            (Some(start), Some(end)) if end > start => &text[start..=end],
            _ => text,
        };

        match serde_json::from_str::<RawSummary>(candidate) {
            Ok(raw) => (raw.summary, raw.key_topics, raw.action_items),
            Err(_) => (text.trim().to_string(), Vec::new(), Vec::new()),
        }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    fn name(&self) -> &str {
        "llm"
    }

    async fn summarize(
        &self,
        messages: &[Message],
        max_tokens: usize,
    ) -> std::result::Result<SummaryOutput, ProviderError> {
        let transcript = Self::render_transcript(messages);

        let system = format!(
            "You summarize customer support conversations. Respond with a JSON object: \
             {{\"summary\": string, \"key_topics\": [string], \"action_items\": [string]}}. \
             Keep the summary under {max_tokens} tokens. Preserve order numbers, dates, and \
             commitments made to the customer."
        );

        let request = GenerationRequest {
            model: self.model_name.clone(),
            system,
            messages: vec![Message::user(format!(
                "Summarize this conversation:\n\n{transcript}"
            ))],
            temperature: 0.0,
            max_tokens: Some(max_tokens as u32),
            stop: vec![],
        };

        let generation = self.model.generate(request).await?;
        let (summary, key_topics, action_items) = Self::parse_output(&generation.text);

        debug!(
            summary_len = summary.len(),
            topics = key_topics.len(),
            "Conversation span summarized"
        );

        // 4-chars-per-token estimate, same heuristic the assembler prices with.
        let token_count = summary.len().div_ceil(4);

        Ok(SummaryOutput { summary, key_topics, action_items, token_count })
    }
}

#[derive(Debug, Deserialize)]
struct RawSummary {
    summary: String,
    #[serde(default)]
    key_topics: Vec<String>,
    #[serde(default)]
    action_items: Vec<String>,
}
