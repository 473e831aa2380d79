//! External model-service clients for crabdesk.
//!
//! All clients implement the corresponding `crabdesk_core` trait, so the
//! engine never knows which vendor is behind a call.

pub mod openai_compat;
pub mod rerank;
pub mod retry;
pub mod summarizer;

pub use openai_compat::OpenAiCompatProvider;
pub use rerank::CohereReranker;
pub use retry::RetryModel;
pub use summarizer::LlmSummarizer;
