//! crabdesk CLI — the main entry point.
//!
//! Commands:
//! - `onboard` — Write a default config file
//! - `chat`    — Talk to the support engine (single message or interactive)
//! - `doctor`  — Validate configuration and check provider reachability
//! - `purge`   — Enforce the PDPA retention window on stored sessions

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "crabdesk",
    about = "crabdesk — retrieval-augmented customer support engine",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Onboard,

    /// Chat with the support engine
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Continue an existing session
        #[arg(short, long)]
        session: Option<String>,

        /// Knowledge-base JSON file to index for this run
        #[arg(short, long)]
        knowledge: Option<String>,
    },

    /// Validate configuration and check provider health
    Doctor,

    /// Delete sessions past the PDPA retention window
    Purge,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run()?,
        Commands::Chat { message, session, knowledge } => {
            commands::chat::run(message, session, knowledge).await?
        }
        Commands::Doctor => commands::doctor::run().await?,
        Commands::Purge => commands::purge::run().await?,
    }

    Ok(())
}
