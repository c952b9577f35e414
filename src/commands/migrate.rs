//! Migrate command implementation.

use anyhow::{Context, Result};
use std::path::Path;

use super::{load_config, open_store, StoreKind};

/// Run the migrate command
pub async fn run(config_path: &Path, kind: StoreKind) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config, kind).await?;

    store.migrate().await.context("Migration failed")?;

    println!("[OK] Schema ready in database '{}'", config.database.name);
    Ok(())
}
