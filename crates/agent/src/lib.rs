//! The crabdesk turn engine.
//!
//! One customer message in, one arbitrated outcome out:
//!
//! 1. **Scrub** the inbound message (PDPA) and analyze it (language,
//!    intent, sentiment, human-request and sensitive-topic signals)
//! 2. **Retrieve** grounding chunks for the query
//! 3. **Assemble** a token-bounded prompt context (summarizing old history
//!    when the session has grown past the threshold)
//! 4. **Arbitrate**: generate a draft, score confidence, and decide between
//!    responding, asking a clarifying question, or escalating to a human
//! 5. **Commit** the turn to the session store — all or nothing
//!
//! Turns across sessions run concurrently; turns within one session are
//! serialized by an advisory lock with a bounded wait.

pub mod analysis;
pub mod arbiter;
pub mod confidence;
pub mod engine;
pub mod escalation;
pub mod stream_event;

#[cfg(test)]
pub mod test_helpers;

pub use arbiter::{ArbiterOutcome, ResponseArbiter, TurnSignals};
pub use confidence::ConfidenceInputs;
pub use engine::{EngineDeps, SupportEngine, TurnRequest};
pub use stream_event::TurnStreamEvent;
