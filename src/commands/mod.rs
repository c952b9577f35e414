//! CLI command implementations.

pub mod activate;
pub mod compile;
pub mod migrate;
pub mod run;
pub mod status;
pub mod sync;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use crate::config::Config;
use crate::store::{MemoryStore, PgStore, Store};

/// Which store backend a command talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

/// Load and validate the configuration file (defaults if absent, then env overrides).
pub fn load_config(config_path: &Path) -> Result<Config> {
    Config::load(config_path)
}

/// Open the configured store.
pub async fn open_store(config: &Config, kind: StoreKind) -> Result<Arc<dyn Store>> {
    match kind {
        StoreKind::Postgres => Ok(Arc::new(PgStore::connect(&config.database).await?)),
        StoreKind::Memory => {
            warn!("Using in-memory store: nothing will be persisted");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
