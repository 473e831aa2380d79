//! Two-stage retrieval pipeline.
//!
//! Stage one fetches a broad candidate pool: dense similarity search over
//! the knowledge store, optionally blended with lexical scoring (hybrid
//! weight α, where 1.0 = pure semantic). Stage two optionally reranks the
//! pool with a cross-encoder-style model and cuts it down to the final K.
//!
//! Scores are normalized to [0, 1] throughout; candidates below the
//! configured minimum are dropped (an empty result is a valid outcome, a
//! backend outage is not — that propagates as `RetrievalUnavailable`).

pub mod retriever;
pub mod scoring;

pub use retriever::Retriever;
pub use scoring::{blend_hybrid, clamp_unit, normalize_by_max, sort_by_score_stable};
