//! Score normalization and hybrid blending.
//!
//! Both retrieval legs return backend-native scores: cosine similarity in
//! [-1, 1] for the dense leg, unbounded term-frequency or BM25-style values
//! for the lexical leg. Everything is brought into [0, 1] before blending
//! so the α weight and the minimum-score threshold are meaningful.

use crabdesk_core::chunk::DocumentChunk;
use std::collections::HashMap;

/// Clamp dense-leg scores into [0, 1].
///
/// Cosine similarity is already unit-scaled; negative similarity carries no
/// relevance signal and maps to zero.
pub fn clamp_unit(chunks: &mut [DocumentChunk]) {
    for chunk in chunks {
        chunk.score = chunk.score.clamp(0.0, 1.0);
    }
}

/// Normalize lexical-leg scores by the maximum in the batch.
///
/// The best lexical hit maps to 1.0; an empty batch is untouched.
pub fn normalize_by_max(chunks: &mut [DocumentChunk]) {
    let max = chunks.iter().map(|c| c.score).fold(0.0f32, f32::max);
    if max <= 0.0 {
        return;
    }
    for chunk in chunks {
        chunk.score = (chunk.score / max).clamp(0.0, 1.0);
    }
}

/// Sort by score descending with a stable tie-break.
///
/// Equal scores keep the original candidate-pool rank (earlier wins) —
/// never an arbitrary order.
pub fn sort_by_score_stable(chunks: Vec<DocumentChunk>) -> Vec<DocumentChunk> {
    let mut indexed: Vec<(usize, DocumentChunk)> = chunks.into_iter().enumerate().collect();
    indexed.sort_by(|(rank_a, a), (rank_b, b)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(rank_a.cmp(rank_b))
    });
    indexed.into_iter().map(|(_, c)| c).collect()
}

/// Blend the semantic and lexical candidate pools.
///
/// Final score is `α·semantic + (1−α)·lexical`, renormalized over the legs
/// a chunk actually appears in — a chunk found only by the dense leg keeps
/// its dense score rather than being halved for missing lexical evidence.
/// Candidate-pool rank (semantic order first, then new lexical entries) is
/// preserved for tie-breaking.
pub fn blend_hybrid(
    semantic: Vec<DocumentChunk>,
    lexical: Vec<DocumentChunk>,
    alpha: f32,
) -> Vec<DocumentChunk> {
    // id → (pool_rank, chunk, semantic score, lexical score)
    let mut merged: Vec<(DocumentChunk, Option<f32>, Option<f32>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for chunk in semantic {
        let score = chunk.score;
        index.insert(chunk.id.clone(), merged.len());
        merged.push((chunk, Some(score), None));
    }

    for chunk in lexical {
        match index.get(&chunk.id) {
            Some(&i) => merged[i].2 = Some(chunk.score),
            None => {
                index.insert(chunk.id.clone(), merged.len());
                let score = chunk.score;
                merged.push((chunk, None, Some(score)));
            }
        }
    }

    let blended: Vec<DocumentChunk> = merged
        .into_iter()
        .map(|(mut chunk, sem, lex)| {
            let (mut numerator, mut denominator) = (0.0f32, 0.0f32);
            if let Some(s) = sem {
                numerator += alpha * s;
                denominator += alpha;
            }
            if let Some(l) = lex {
                numerator += (1.0 - alpha) * l;
                denominator += 1.0 - alpha;
            }
            chunk.score = if denominator > 0.0 { numerator / denominator } else { 0.0 };
            chunk
        })
        .collect();

    sort_by_score_stable(blended)
}
