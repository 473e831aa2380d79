//! `crabdesk chat` — talk to the support engine from the terminal.
//!
//! Wires the engine with real providers from configuration, an optional
//! JSON knowledge file indexed into the in-memory store at startup, and
//! the configured session store.

use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crabdesk_agent::{EngineDeps, SupportEngine, TurnRequest};
use crabdesk_config::EngineConfig;
use crabdesk_core::chunk::DocumentChunk;
use crabdesk_core::event::EventBus;
use crabdesk_core::knowledge::KnowledgeStore;
use crabdesk_core::memory::SessionStore;
use crabdesk_core::provider::{EmbeddingProvider, LanguageModel, Reranker};
use crabdesk_core::response::AgentResponse;
use crabdesk_core::session::Language;
use crabdesk_core::ticket::TicketSink;
use crabdesk_memory::{InMemoryKnowledgeStore, InMemorySessionStore, SqliteSessionStore};
use crabdesk_providers::{CohereReranker, LlmSummarizer, OpenAiCompatProvider, RetryModel};
use crabdesk_ticketing::{InMemoryTicketSink, WebhookTicketConfig, WebhookTicketSink};

/// One entry in a knowledge JSON file.
#[derive(Debug, Deserialize)]
struct KnowledgeDoc {
    #[serde(default)]
    id: Option<String>,
    source: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    language: Option<String>,
    content: String,
}

pub async fn run(
    message: Option<String>,
    session: Option<String>,
    knowledge_file: Option<String>,
) -> anyhow::Result<()> {
    let config = EngineConfig::load()?;
    let api_key = config
        .llm
        .api_key
        .clone()
        .context("No API key configured. Run `crabdesk onboard` and set CRABDESK_API_KEY.")?;

    // One OpenAI-compatible client covers chat and embeddings.
    let provider = Arc::new(
        OpenAiCompatProvider::new("openai", &config.llm.api_url, api_key.clone())
            .with_embedding(&config.llm.embedding_model, config.llm.embedding_dimensions),
    );
    let model: Arc<dyn LanguageModel> = provider.clone();
    let embedder: Arc<dyn EmbeddingProvider> = provider.clone();

    let reranker: Option<Arc<dyn Reranker>> = config
        .llm
        .rerank_api_key
        .as_ref()
        .map(|key| {
            Arc::new(CohereReranker::new(key.clone(), config.llm.rerank_model.clone()))
                as Arc<dyn Reranker>
        });

    // The summarizer shares the generation retry policy.
    let summarizer = Arc::new(LlmSummarizer::new(
        Arc::new(RetryModel::new(model.clone(), config.arbiter.max_llm_retries)),
        config.llm.model.clone(),
    ));

    let knowledge = load_knowledge(knowledge_file.as_deref(), embedder.as_ref()).await?;

    let sessions: Arc<dyn SessionStore> = match config.memory.backend.as_str() {
        "sqlite" => Arc::new(
            SqliteSessionStore::new(&config.memory.db_path)
                .await
                .map_err(|e| anyhow::anyhow!("opening session store: {e}"))?,
        ),
        _ => Arc::new(InMemorySessionStore::new()),
    };

    let tickets: Arc<dyn TicketSink> = match &config.ticketing.webhook_url {
        Some(url) => Arc::new(WebhookTicketSink::new(WebhookTicketConfig {
            url: url.clone(),
            shared_secret: config.ticketing.shared_secret.clone(),
        })),
        None => Arc::new(InMemoryTicketSink::new()),
    };

    let engine = SupportEngine::new(
        config,
        EngineDeps {
            knowledge,
            embedder,
            reranker,
            model,
            summarizer,
            sessions,
            tickets,
            events: Arc::new(EventBus::default()),
        },
    )?;

    let session_id = session.unwrap_or_else(|| format!("cli-{}", std::process::id()));

    match message {
        Some(text) => {
            let response = engine
                .handle_turn(TurnRequest {
                    session_id: Some(session_id),
                    message: text,
                    customer_id: None,
                    profile: None,
                })
                .await?;
            print_response(&response);
        }
        None => {
            println!("crabdesk interactive chat — session {session_id} (ctrl-d to exit)\n");
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                print!("> ");
                use std::io::Write;
                std::io::stdout().flush().ok();

                let Some(line) = lines.next_line().await? else {
                    break;
                };
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }

                match engine
                    .handle_turn(TurnRequest {
                        session_id: Some(session_id.clone()),
                        message: line,
                        customer_id: None,
                        profile: None,
                    })
                    .await
                {
                    Ok(response) => print_response(&response),
                    Err(e) => println!("  {}", crabdesk_agent::engine::user_facing_error(&e)),
                }
            }
        }
    }

    Ok(())
}

/// Index a knowledge JSON file, embedding each chunk at startup.
async fn load_knowledge(
    path: Option<&str>,
    embedder: &dyn EmbeddingProvider,
) -> anyhow::Result<Arc<dyn KnowledgeStore>> {
    let store = InMemoryKnowledgeStore::new();

    if let Some(path) = path {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
        let docs: Vec<KnowledgeDoc> =
            serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;

        let total = docs.len();
        for (i, doc) in docs.into_iter().enumerate() {
            let embedding = embedder
                .embed(&doc.content)
                .await
                .map_err(|e| anyhow::anyhow!("embedding chunk {i}: {e}"))?;
            store
                .index(DocumentChunk {
                    id: doc.id.unwrap_or_else(|| format!("{}#{i}", doc.source)),
                    source: doc.source,
                    category: doc.category,
                    language: doc
                        .language
                        .as_deref()
                        .and_then(Language::from_code)
                        .unwrap_or_default(),
                    content: doc.content,
                    embedding: Some(embedding),
                    score: 0.0,
                })
                .await;
        }
        info!(chunks = total, path, "Knowledge file indexed");
    }

    Ok(Arc::new(store))
}

fn print_response(response: &AgentResponse) {
    println!("\n{}\n", response.content);

    if !response.sources.is_empty() {
        println!("  sources:");
        for source in &response.sources {
            println!("    - {} (relevance {:.2})", source.chunk_id, source.relevance_score);
        }
    }
    if !response.quick_replies.is_empty() {
        println!("  try: {}", response.quick_replies.join(" | "));
    }
    if response.escalated {
        let reason = response
            .escalation_reason
            .map(|r| r.as_str())
            .unwrap_or("already with support team");
        println!("  [escalated: {reason}]");
    }
    println!(
        "  confidence {:.2} · {}ms",
        response.confidence, response.processing_time_ms
    );
}
