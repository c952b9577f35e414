//! # intelsync - threat-intelligence delta sync daemon
//!
//! Keeps three collections (malware signatures, YARA rules, an IPv4
//! blacklist) in sync with a remote threat-intelligence API by fetching only
//! what changed since the last applied update, and enforces the blacklist as
//! an nftables ruleset.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        intelsync                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SyncScheduler (tokio, CancellationToken)                   │
//! │    └── one cycle per interval, never overlapping            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  DeltaFetcher (reqwest + rustls)                            │
//! │    └── GET /api/database/updates?delta=<cursor>             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ReconciliationEngine                                       │
//! │    └── removals before insertions, cursor advance           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Store (sqlx PostgreSQL / in-memory)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ActivationWorker (watch generation counter)                │
//! │    ├── BlocklistCompiler -> nftables text                   │
//! │    └── RuleActivator -> nft flush ruleset; nft -f <path>    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use intelsync::activation::ActivationWorker;
//! use intelsync::activator::RuleActivator;
//! use intelsync::clock::SystemClock;
//! use intelsync::config::Config;
//! use intelsync::fetcher::DeltaFetcher;
//! use intelsync::scheduler::SyncScheduler;
//! use intelsync::store::PgStore;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("/etc/intelsync/config.yaml")?;
//!     let store = Arc::new(PgStore::connect(&config.database).await?);
//!     let cancel = CancellationToken::new();
//!
//!     let activator = Arc::new(RuleActivator::new(&config.ruleset));
//!     let (activation, _worker) = ActivationWorker::spawn(store.clone(), activator, cancel.clone());
//!
//!     let scheduler = SyncScheduler::new(
//!         Arc::new(DeltaFetcher::new(&config)?),
//!         store,
//!         Arc::new(SystemClock),
//!         config.sync_interval()?,
//!     )
//!     .with_activation(activation);
//!
//!     scheduler.run(cancel).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`activation`] - Single activation worker with coalescing triggers
//! - [`activator`] - Ruleset file write and nft reload
//! - [`cli`] - Command-line interface definitions
//! - [`clock`] - Injectable time source
//! - [`cmd_abstraction`] - External command execution trait
//! - [`commands`] - CLI command implementations
//! - [`compiler`] - Blacklist to nftables ruleset
//! - [`config`] - Configuration parsing and validation
//! - [`error`] - Error taxonomy
//! - [`fetcher`] - HTTP client for the delta endpoint
//! - [`fs_abstraction`] - Filesystem trait
//! - [`lock`] - File locking for concurrent execution prevention
//! - [`model`] - Categories, cursor and update payload
//! - [`reconcile`] - Applying deltas to the store
//! - [`scheduler`] - Sync loop
//! - [`signal`] - Graceful shutdown signal handling
//! - [`store`] - Store trait and backends
//! - [`utils`] - Formatting helpers
//! - [`validation`] - Input validation

pub mod activation;
pub mod activator;
pub mod cli;
pub mod clock;
pub mod cmd_abstraction;
pub mod commands;
pub mod compiler;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod fs_abstraction;
pub mod lock;
pub mod model;
pub mod reconcile;
pub mod scheduler;
pub mod signal;
pub mod store;
pub mod utils;
pub mod validation;

pub use config::Config;
pub use error::SyncError;
