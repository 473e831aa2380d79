//! Token-budgeted context assembly.
//!
//! Produces a single bounded prompt context from heterogeneous inputs,
//! filling the budget in priority order:
//!
//! 1. **System/business instructions** — fixed cost, never trimmed
//! 2. **Recent raw messages** — newest kept, capped by count and budget
//! 3. **Rolling summary** — stands in for the raw span it covers
//! 4. **Retrieved chunks** — score descending, whole chunks only
//!
//! Assembly is deterministic: identical inputs (including the budget)
//! always yield identical output and identical truncation decisions.

pub mod assembler;
pub mod summarize;
pub mod token;

pub use assembler::{
    AssemblyError, AssemblyInput, ContextAssembler, DropInfo, LayerStats, PromptContext,
};
pub use summarize::{SummaryPlanner, SummarySpan};
