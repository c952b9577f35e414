//! Compile command implementation.

use anyhow::{Context, Result};
use std::path::Path;

use super::{load_config, open_store, StoreKind};
use crate::compiler::compile;
use crate::fs_abstraction::{FileSystem, RealFileSystem};

/// Run the compile command
pub async fn run(config_path: &Path, kind: StoreKind, output: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config, kind).await?;

    let ips = store.list_ips().await.context("Failed to read blacklist")?;
    let ruleset = compile(&ips);

    match output {
        Some(path) => {
            write_ruleset(&RealFileSystem, path, &ruleset)?;
            println!("[OK] {} entries written to {}", ips.len(), path.display());
        }
        None => print!("{}", ruleset),
    }
    Ok(())
}

fn write_ruleset<F: FileSystem>(fs: &F, path: &Path, ruleset: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs.create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs.write(path, ruleset.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))
}
