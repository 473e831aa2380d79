//! Confidence scoring.
//!
//! Blends three signals into one [0, 1] score: the model's self-reported
//! (or grounding-agreement) confidence, the average relevance of cited
//! sources, and a penalty when session sentiment has dipped below the
//! escalation threshold. Weights come from configuration; all are
//! non-negative, so the score is monotonic in each input by construction —
//! better grounding or sources can never lower it, worse sentiment can
//! never raise it.

use crabdesk_config::ArbiterConfig;

/// Inputs to one turn's confidence computation.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceInputs {
    /// Model self-reported confidence; falls back to source relevance when
    /// the provider exposes none.
    pub grounding: Option<f32>,
    /// Mean relevance of the sources placed into the context.
    pub avg_source_relevance: f32,
    /// Current session sentiment in [-1, 1].
    pub sentiment: f32,
}

/// Compute the blended confidence score.
pub fn score(inputs: &ConfidenceInputs, config: &ArbiterConfig) -> f32 {
    let grounding = inputs
        .grounding
        .unwrap_or(inputs.avg_source_relevance)
        .clamp(0.0, 1.0);
    let sources = inputs.avg_source_relevance.clamp(0.0, 1.0);

    // Penalty only engages below the escalation threshold; neutral or
    // positive sentiment neither helps nor hurts.
    let penalty = (config.escalation_sentiment_threshold - inputs.sentiment).max(0.0);

    let raw = config.grounding_weight * grounding + config.source_weight * sources
        - config.sentiment_penalty_weight * penalty;

    raw.clamp(0.0, 1.0)
}
