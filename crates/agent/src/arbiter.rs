//! The response arbiter.
//!
//! Each turn is a small state machine:
//!
//! ```text
//! DRAFTING → SCORED → { RESPONDING | CLARIFYING | ESCALATING }
//! ```
//!
//! `DRAFTING` invokes the language model (the engine hands the arbiter a
//! retry-wrapped model, so transport failures here mean the retry budget is
//! already spent). `SCORED` blends confidence from grounding, source
//! relevance, and sentiment. The terminal transition picks between a direct
//! answer, a clarifying question (not an escalation, no ticket), and a
//! human handoff.

use crabdesk_config::{ArbiterConfig, LlmConfig};
use crabdesk_context::PromptContext;
use crabdesk_core::chunk::DocumentChunk;
use crabdesk_core::error::Error;
use crabdesk_core::message::Message;
use crabdesk_core::provider::{GenerationRequest, LanguageModel, TokenUsage};
use crabdesk_core::response::{EscalationReason, SourceCitation};
use crabdesk_core::session::Intent;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::confidence::{self, ConfidenceInputs};

/// Per-turn signals computed before drafting.
#[derive(Debug, Clone, Copy)]
pub struct TurnSignals {
    /// Blended session sentiment in [-1, 1].
    pub sentiment: f32,
    /// Detected intent of the user message.
    pub intent: Intent,
    /// The customer explicitly asked for a human.
    pub explicit_human_request: bool,
    /// The message matched the sensitive-topic filter.
    pub sensitive_topic: bool,
}

/// Terminal outcome of one turn's arbitration.
#[derive(Debug, Clone)]
pub enum ArbiterOutcome {
    /// Answer directly.
    Respond {
        text: String,
        confidence: f32,
        model: String,
        usage: Option<TokenUsage>,
    },
    /// Ask a clarifying follow-up. Not an escalation; no ticket.
    Clarify { question: String, confidence: f32 },
    /// Hand off to a human.
    Escalate { reason: EscalationReason, confidence: f32 },
}

/// States of the per-turn machine, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Drafting,
    Scored,
    Responding,
    Clarifying,
    Escalating,
}

/// Decides each turn's outcome.
pub struct ResponseArbiter {
    model: Arc<dyn LanguageModel>,
    model_name: String,
    temperature: f32,
    max_response_tokens: u32,
    config: ArbiterConfig,
}

impl ResponseArbiter {
    pub fn new(model: Arc<dyn LanguageModel>, llm: &LlmConfig, config: ArbiterConfig) -> Self {
        Self {
            model,
            model_name: llm.model.clone(),
            temperature: llm.temperature,
            max_response_tokens: llm.max_response_tokens,
            config,
        }
    }

    /// Run the turn state machine to a terminal outcome.
    ///
    /// Never returns an error: provider failures are absorbed into an
    /// `Escalate` outcome so the caller can always hand the customer a
    /// coherent message.
    pub async fn decide(
        &self,
        context: &PromptContext,
        user_message: &Message,
        signals: &TurnSignals,
    ) -> ArbiterOutcome {
        let mut state = TurnState::Drafting;
        debug!(?state, "Turn started");

        // ── DRAFTING ───────────────────────────────────────────────────────
        let mut messages = context.history.clone();
        messages.push(user_message.clone());

        let request = GenerationRequest {
            model: self.model_name.clone(),
            system: context.system_text.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: Some(self.max_response_tokens),
            stop: vec![],
        };

        let generation = match self.model.generate(request).await {
            Ok(generation) => generation,
            Err(e) => {
                // The model is retry-wrapped; reaching here means the retry
                // budget is exhausted.
                warn!(error = %e, "Drafting failed after retries, escalating");
                return self.escalate(EscalationReason::RepeatedFailure, 0.0);
            }
        };

        // ── SCORED ─────────────────────────────────────────────────────────
        state = TurnState::Scored;
        let avg_relevance = if context.chunks_used.is_empty() {
            0.0
        } else {
            context.chunks_used.iter().map(|c| c.score).sum::<f32>()
                / context.chunks_used.len() as f32
        };

        let confidence = confidence::score(
            &ConfidenceInputs {
                grounding: generation.self_confidence,
                avg_source_relevance: avg_relevance,
                sentiment: signals.sentiment,
            },
            &self.config,
        );

        debug!(?state, confidence, avg_relevance, "Turn scored");

        // ── Terminal transition ────────────────────────────────────────────
        // Hard escalation triggers outrank confidence: a furious customer
        // gets a human even when the draft looks good.
        if signals.explicit_human_request {
            return self.escalate(EscalationReason::ExplicitRequest, confidence);
        }
        if signals.sensitive_topic {
            return self.escalate(EscalationReason::SensitiveTopic, confidence);
        }
        if signals.sentiment < self.config.escalation_sentiment_threshold {
            return self.escalate(EscalationReason::NegativeSentiment, confidence);
        }

        if confidence >= self.config.confidence_threshold {
            let state = TurnState::Responding;
            info!(?state, confidence, "Responding directly");
            return ArbiterOutcome::Respond {
                text: generation.text,
                confidence,
                model: generation.model,
                usage: generation.usage,
            };
        }

        if confidence >= self.config.clarify_threshold {
            let state = TurnState::Clarifying;
            info!(?state, confidence, "Asking a clarifying question");
            return ArbiterOutcome::Clarify {
                question: clarifying_question(signals.intent),
                confidence,
            };
        }

        self.escalate(EscalationReason::LowConfidence, confidence)
    }

    fn escalate(&self, reason: EscalationReason, confidence: f32) -> ArbiterOutcome {
        let state = TurnState::Escalating;
        info!(?state, reason = reason.as_str(), confidence, "Escalating to a human");
        ArbiterOutcome::Escalate { reason, confidence }
    }
}

/// Build the citation list from the chunks the assembler actually used.
pub fn citations_from(chunks: &[DocumentChunk]) -> Vec<SourceCitation> {
    chunks
        .iter()
        .map(|c| SourceCitation {
            chunk_id: c.id.clone(),
            relevance_score: c.score,
            snippet: Some(c.snippet(200)),
        })
        .collect()
}

/// Guard: every citation must reference a chunk inside the assembled
/// context. A violation is an internal bug, never shown to the customer —
/// the caller converts it into an escalation outcome.
pub fn verify_citations(
    citations: &[SourceCitation],
    context: &PromptContext,
) -> Result<(), Error> {
    let allowed: HashSet<&str> = context.chunk_ids().into_iter().collect();
    for citation in citations {
        if !allowed.contains(citation.chunk_id.as_str()) {
            return Err(Error::GroundingViolation { chunk_id: citation.chunk_id.clone() });
        }
    }
    Ok(())
}

fn clarifying_question(intent: Intent) -> String {
    match intent {
        Intent::OrderStatus => {
            "Could you share your order number so I can look into this for you?".into()
        }
        Intent::Pricing | Intent::ProductInquiry => {
            "Could you tell me which product you're asking about?".into()
        }
        Intent::TechnicalSupport => {
            "Could you describe what happens when the problem occurs, and any message you see?"
                .into()
        }
        _ => "I want to be sure I give you the right answer — could you share a little more \
              detail about what you need?"
            .into(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
