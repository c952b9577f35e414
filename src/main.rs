//! intelsync - threat-intelligence delta sync daemon
//!
//! Keeps a local copy of malware signatures, YARA rules and an IP blacklist
//! in sync with a remote API, and enforces the blacklist through nftables.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use intelsync::cli::{Cli, Commands};
use intelsync::commands::StoreKind;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let store = if cli.memory {
        StoreKind::Memory
    } else {
        StoreKind::Postgres
    };

    match cli.command {
        Commands::Run => intelsync::commands::run::run(&cli.config, store).await,
        Commands::Sync { no_activate } => {
            intelsync::commands::sync::run(&cli.config, store, no_activate).await
        }
        Commands::Compile { output } => {
            intelsync::commands::compile::run(&cli.config, store, output.as_deref()).await
        }
        Commands::Activate => intelsync::commands::activate::run(&cli.config, store).await,
        Commands::Status => intelsync::commands::status::run(&cli.config, store).await,
        Commands::Migrate => intelsync::commands::migrate::run(&cli.config, store).await,
        Commands::Version => {
            println!("intelsync {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
