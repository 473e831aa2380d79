//! `crabdesk onboard` — write a default configuration file.

use anyhow::Context;
use crabdesk_config::EngineConfig;

pub fn run() -> anyhow::Result<()> {
    let config_dir = EngineConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        return Ok(());
    }

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating {}", config_dir.display()))?;
    std::fs::write(&config_path, EngineConfig::default_toml())
        .with_context(|| format!("writing {}", config_path.display()))?;

    println!("Wrote default config to {}", config_path.display());
    println!("Set your API key via CRABDESK_API_KEY or the [llm] section.");
    Ok(())
}
