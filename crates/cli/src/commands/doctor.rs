//! `crabdesk doctor` — validate configuration and check collaborators.

use crabdesk_config::EngineConfig;
use crabdesk_core::provider::LanguageModel;
use crabdesk_providers::OpenAiCompatProvider;

pub async fn run() -> anyhow::Result<()> {
    println!("crabdesk doctor\n");

    let config = match EngineConfig::load() {
        Ok(config) => {
            println!("  [ok] configuration loads and validates");
            config
        }
        Err(e) => {
            println!("  [fail] configuration: {e}");
            return Ok(());
        }
    };

    match &config.llm.api_key {
        Some(_) => println!("  [ok] LLM API key present"),
        None => {
            println!("  [warn] no LLM API key (set CRABDESK_API_KEY)");
            return Ok(());
        }
    }

    let provider = OpenAiCompatProvider::new(
        "openai",
        &config.llm.api_url,
        config.llm.api_key.clone().unwrap_or_default(),
    );
    match provider.health_check().await {
        Ok(true) => println!("  [ok] provider reachable at {}", config.llm.api_url),
        Ok(false) => println!("  [warn] provider at {} rejected the health check", config.llm.api_url),
        Err(e) => println!("  [fail] provider unreachable: {e}"),
    }

    match &config.ticketing.webhook_url {
        Some(url) => println!("  [ok] ticketing webhook configured ({url})"),
        None => println!("  [info] no ticketing webhook; escalations stay local"),
    }

    println!("\nmemory backend: {} ({})", config.memory.backend, config.memory.db_path);
    println!("retention: {} days", config.compliance.data_retention_days);
    Ok(())
}
