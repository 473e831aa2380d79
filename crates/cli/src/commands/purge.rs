//! `crabdesk purge` — enforce the PDPA retention window.

use std::sync::Arc;

use crabdesk_compliance::RetentionPolicy;
use crabdesk_config::EngineConfig;
use crabdesk_core::event::EventBus;
use crabdesk_memory::SqliteSessionStore;

pub async fn run() -> anyhow::Result<()> {
    let config = EngineConfig::load()?;

    if config.memory.backend != "sqlite" {
        println!("Nothing to purge: backend '{}' is not persistent.", config.memory.backend);
        return Ok(());
    }

    let store = SqliteSessionStore::new(&config.memory.db_path)
        .await
        .map_err(|e| anyhow::anyhow!("opening session store: {e}"))?;

    let policy = RetentionPolicy::new(&config.compliance);
    let events = Arc::new(EventBus::default());
    let purged = policy
        .enforce(&store, &events)
        .await
        .map_err(|e| anyhow::anyhow!("purging sessions: {e}"))?;

    println!(
        "Purged {purged} session(s) idle longer than {} days.",
        config.compliance.data_retention_days
    );
    Ok(())
}
