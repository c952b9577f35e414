//! Status command implementation.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;

use super::{load_config, open_store, StoreKind};
use crate::fs_abstraction::{FileSystem, RealFileSystem};
use crate::model::Category;
use crate::utils::{format_age, format_count};

/// Run the status command
pub async fn run(config_path: &Path, kind: StoreKind) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config, kind).await?;

    println!();
    println!(
        "API: {}",
        if config.api_base_url.is_empty() {
            "(not configured)"
        } else {
            config.api_base_url.as_str()
        }
    );
    println!("Sync interval: {}", config.sync_interval);
    println!();

    for category in Category::ALL {
        let count = store
            .count(category)
            .await
            .with_context(|| format!("Failed to count {}", category))?;
        println!("{:<26} {}", category.to_string(), format_count(count));
    }
    println!();

    match store.read_cursor().await.context("Failed to read cursor")? {
        Some(cursor) => println!(
            "Last update: {} UTC ({} ago)",
            cursor,
            format_age(Utc::now() - cursor.timestamp())
        ),
        None => println!("Last update: never (next sync fetches everything)"),
    }

    let ruleset = &config.ruleset.path;
    if RealFileSystem.exists(ruleset) {
        println!("Ruleset: {}", ruleset.display());
    } else {
        println!("Ruleset: {} (not written yet)", ruleset.display());
    }
    println!();

    Ok(())
}
