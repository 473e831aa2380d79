//! Configuration loading, validation, and management for crabdesk.
//!
//! Loads configuration from `~/.crabdesk/config.toml` with environment
//! variable overrides. Validates all settings at startup — an infeasible
//! token budget is a configuration error rejected here, never something a
//! turn silently truncates away.
//!
//! The loaded [`EngineConfig`] is an immutable value passed by reference
//! into each component at construction time; there is no ambient global
//! settings object.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.crabdesk/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// LLM / embedding provider settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retrieval pipeline settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Context assembly settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Response arbiter settings
    #[serde(default)]
    pub arbiter: ArbiterConfig,

    /// Session memory settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Business context settings
    #[serde(default)]
    pub business: BusinessConfig,

    /// PDPA compliance settings
    #[serde(default)]
    pub compliance: ComplianceConfig,

    /// Ticketing webhook settings
    #[serde(default)]
    pub ticketing: TicketingConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("llm", &self.llm)
            .field("retrieval", &self.retrieval)
            .field("context", &self.context)
            .field("arbiter", &self.arbiter)
            .field("memory", &self.memory)
            .field("business", &self.business)
            .field("compliance", &self.compliance)
            .field("ticketing", &self.ticketing)
            .finish()
    }
}

// ── LLM ──────────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key for the chat/embedding provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Primary chat model
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per response
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: u32,

    /// Embedding model
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding dimensionality
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,

    /// Reranker API key (empty = reuse `api_key`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_api_key: Option<String>,

    /// Reranker model
    #[serde(default = "default_rerank_model")]
    pub rerank_model: String,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_response_tokens() -> u32 {
    1024
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_embedding_dimensions() -> usize {
    1536
}
fn default_rerank_model() -> String {
    "rerank-english-v3.0".into()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_response_tokens: default_max_response_tokens(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            rerank_api_key: None,
            rerank_model: default_rerank_model(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_response_tokens", &self.max_response_tokens)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dimensions", &self.embedding_dimensions)
            .field("rerank_api_key", &redact(&self.rerank_api_key))
            .field("rerank_model", &self.rerank_model)
            .finish()
    }
}

// ── Retrieval ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidate pool size for the broad first stage
    #[serde(default = "default_top_k_retrieval")]
    pub top_k_retrieval: usize,

    /// Final result count after reranking
    #[serde(default = "default_top_k_rerank")]
    pub top_k_rerank: usize,

    /// Minimum normalized relevance score; lower-scored chunks are dropped
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// Hybrid blend weight: 1.0 = pure semantic, 0.0 = pure lexical
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f32,

    /// Whether to run the reranking pass
    #[serde(default = "default_true")]
    pub rerank_enabled: bool,
}

fn default_top_k_retrieval() -> usize {
    50
}
fn default_top_k_rerank() -> usize {
    5
}
fn default_min_score() -> f32 {
    0.7
}
fn default_hybrid_alpha() -> f32 {
    0.5
}
fn default_true() -> bool {
    true
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k_retrieval: default_top_k_retrieval(),
            top_k_rerank: default_top_k_rerank(),
            min_score: default_min_score(),
            hybrid_alpha: default_hybrid_alpha(),
            rerank_enabled: true,
        }
    }
}

// ── Context assembly ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Total context token budget per turn
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Tokens reserved for the forthcoming response
    #[serde(default = "default_reserved_for_response")]
    pub reserved_for_response: usize,

    /// Most recent raw messages to include
    #[serde(default = "default_max_conversation_messages")]
    pub max_conversation_messages: usize,

    /// Message count past which the rolling summary kicks in
    #[serde(default = "default_summarization_threshold")]
    pub summarization_threshold: usize,

    /// Max tokens for the rolling summary
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: usize,
}

fn default_max_context_tokens() -> usize {
    4000
}
fn default_reserved_for_response() -> usize {
    1000
}
fn default_max_conversation_messages() -> usize {
    20
}
fn default_summarization_threshold() -> usize {
    15
}
fn default_summary_max_tokens() -> usize {
    500
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            reserved_for_response: default_reserved_for_response(),
            max_conversation_messages: default_max_conversation_messages(),
            summarization_threshold: default_summarization_threshold(),
            summary_max_tokens: default_summary_max_tokens(),
        }
    }
}

// ── Arbiter ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbiterConfig {
    /// Confidence at or above which the agent responds directly
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Lower edge of the ambiguous band; below it the turn escalates
    #[serde(default = "default_clarify_threshold")]
    pub clarify_threshold: f32,

    /// Session sentiment below this escalates regardless of confidence
    #[serde(default = "default_sentiment_threshold")]
    pub escalation_sentiment_threshold: f32,

    /// Weight of the model's self-reported / grounding agreement score
    #[serde(default = "default_grounding_weight")]
    pub grounding_weight: f32,

    /// Weight of the average cited-source relevance
    #[serde(default = "default_source_weight")]
    pub source_weight: f32,

    /// Weight of the sentiment penalty
    #[serde(default = "default_sentiment_penalty_weight")]
    pub sentiment_penalty_weight: f32,

    /// Max retries for the generation call
    #[serde(default = "default_max_llm_retries")]
    pub max_llm_retries: u32,

    /// Whole-turn deadline in seconds
    #[serde(default = "default_response_timeout")]
    pub response_timeout_seconds: u64,

    /// Bounded wait for the per-session lock, in seconds
    #[serde(default = "default_session_lock_wait")]
    pub session_lock_wait_seconds: u64,
}

fn default_confidence_threshold() -> f32 {
    0.7
}
fn default_clarify_threshold() -> f32 {
    0.45
}
fn default_sentiment_threshold() -> f32 {
    -0.5
}
fn default_grounding_weight() -> f32 {
    0.5
}
fn default_source_weight() -> f32 {
    0.3
}
fn default_sentiment_penalty_weight() -> f32 {
    0.4
}
fn default_max_llm_retries() -> u32 {
    3
}
fn default_response_timeout() -> u64 {
    30
}
fn default_session_lock_wait() -> u64 {
    30
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            clarify_threshold: default_clarify_threshold(),
            escalation_sentiment_threshold: default_sentiment_threshold(),
            grounding_weight: default_grounding_weight(),
            source_weight: default_source_weight(),
            sentiment_penalty_weight: default_sentiment_penalty_weight(),
            max_llm_retries: default_max_llm_retries(),
            response_timeout_seconds: default_response_timeout(),
            session_lock_wait_seconds: default_session_lock_wait(),
        }
    }
}

// ── Memory ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Session store backend: "sqlite" or "in_memory"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// SQLite database path (used when backend = "sqlite")
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Idle seconds before a session is considered abandoned
    #[serde(default = "default_session_idle_ttl")]
    pub session_idle_ttl_seconds: u64,
}

fn default_memory_backend() -> String {
    "sqlite".into()
}
fn default_db_path() -> String {
    "crabdesk.db".into()
}
fn default_session_idle_ttl() -> u64 {
    1800
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            db_path: default_db_path(),
            session_idle_ttl_seconds: default_session_idle_ttl(),
        }
    }
}

// ── Business ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessConfig {
    #[serde(default = "default_business_name")]
    pub name: String,

    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Opening time, HH:MM
    #[serde(default = "default_hours_start")]
    pub hours_start: String,

    /// Closing time, HH:MM
    #[serde(default = "default_hours_end")]
    pub hours_end: String,

    /// Working days, comma-separated
    #[serde(default = "default_business_days")]
    pub days: String,

    #[serde(default = "default_support_email")]
    pub support_email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_phone: Option<String>,
}

fn default_business_name() -> String {
    "Your Singapore SMB".into()
}
fn default_timezone() -> String {
    "Asia/Singapore".into()
}
fn default_hours_start() -> String {
    "09:00".into()
}
fn default_hours_end() -> String {
    "18:00".into()
}
fn default_business_days() -> String {
    "Monday,Tuesday,Wednesday,Thursday,Friday".into()
}
fn default_support_email() -> String {
    "support@yourcompany.com".into()
}

impl BusinessConfig {
    /// Working days as a list.
    pub fn working_days(&self) -> Vec<&str> {
        self.days.split(',').map(|d| d.trim()).filter(|d| !d.is_empty()).collect()
    }
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self {
            name: default_business_name(),
            timezone: default_timezone(),
            hours_start: default_hours_start(),
            hours_end: default_hours_end(),
            days: default_business_days(),
            support_email: default_support_email(),
            support_phone: None,
        }
    }
}

// ── Compliance ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceConfig {
    /// Whether inbound messages are scrubbed for PII before processing
    #[serde(default = "default_true")]
    pub pii_scrubbing: bool,

    /// Customer data retention window (PDPA)
    #[serde(default = "default_retention_days")]
    pub data_retention_days: u32,
}

fn default_retention_days() -> u32 {
    30
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            pii_scrubbing: true,
            data_retention_days: default_retention_days(),
        }
    }
}

// ── Ticketing ────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct TicketingConfig {
    /// Webhook URL escalation records are POSTed to. None = in-memory sink.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// HMAC shared secret for signing outbound payloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_secret: Option<String>,
}

impl Default for TicketingConfig {
    fn default() -> Self {
        Self { webhook_url: None, shared_secret: None }
    }
}

impl std::fmt::Debug for TicketingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketingConfig")
            .field("webhook_url", &self.webhook_url)
            .field("shared_secret", &redact(&self.shared_secret))
            .finish()
    }
}

// ── Loading & validation ─────────────────────────────────────────────────

impl EngineConfig {
    /// Load configuration from the default path (~/.crabdesk/config.toml).
    ///
    /// Also checks environment variables:
    /// - `CRABDESK_API_KEY` / `OPENAI_API_KEY` for the LLM key
    /// - `CRABDESK_MODEL` to override the chat model
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.llm.api_key.is_none() {
            config.llm.api_key = std::env::var("CRABDESK_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("CRABDESK_MODEL") {
            config.llm.model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".crabdesk")
    }

    /// Validate the configuration. Called at startup — fail fast.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.retrieval.hybrid_alpha) {
            return Err(ConfigError::ValidationError(
                "retrieval.hybrid_alpha must be between 0.0 and 1.0".into(),
            ));
        }

        if self.retrieval.top_k_rerank == 0 || self.retrieval.top_k_rerank > 200 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k_rerank must be in 1..=200".into(),
            ));
        }

        if self.retrieval.top_k_retrieval < self.retrieval.top_k_rerank {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k_retrieval must be >= retrieval.top_k_rerank".into(),
            ));
        }

        // An infeasible budget is rejected here, not discovered per turn:
        // the reserved response window must leave room for context.
        if self.context.reserved_for_response >= self.context.max_context_tokens {
            return Err(ConfigError::ValidationError(format!(
                "context.reserved_for_response ({}) must be below context.max_context_tokens ({})",
                self.context.reserved_for_response, self.context.max_context_tokens
            )));
        }

        if self.arbiter.clarify_threshold >= self.arbiter.confidence_threshold {
            return Err(ConfigError::ValidationError(
                "arbiter.clarify_threshold must be below arbiter.confidence_threshold".into(),
            ));
        }

        if self.arbiter.grounding_weight < 0.0
            || self.arbiter.source_weight < 0.0
            || self.arbiter.sentiment_penalty_weight < 0.0
        {
            return Err(ConfigError::ValidationError(
                "arbiter confidence weights must be non-negative".into(),
            ));
        }

        if self.arbiter.grounding_weight + self.arbiter.source_weight <= 0.0 {
            return Err(ConfigError::ValidationError(
                "arbiter.grounding_weight + arbiter.source_weight must be > 0".into(),
            ));
        }

        if !(-1.0..=0.0).contains(&self.arbiter.escalation_sentiment_threshold) {
            return Err(ConfigError::ValidationError(
                "arbiter.escalation_sentiment_threshold must be in [-1.0, 0.0]".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.llm.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            context: ContextConfig::default(),
            arbiter: ArbiterConfig::default(),
            memory: MemoryConfig::default(),
            business: BusinessConfig::default(),
            compliance: ComplianceConfig::default(),
            ticketing: TicketingConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for crabdesk_core::Error {
    fn from(err: ConfigError) -> Self {
        crabdesk_core::Error::Config { message: err.to_string() }
    }
}
