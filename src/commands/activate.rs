//! Activate command implementation.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::{load_config, open_store, StoreKind};
use crate::activation::activate_current;
use crate::activator::{check_root, RuleActivator};

/// Run the activate command
pub async fn run(config_path: &Path, kind: StoreKind) -> Result<()> {
    check_root()?;

    let config = load_config(config_path)?;
    let store = open_store(&config, kind).await?;
    let activator = Arc::new(RuleActivator::new(&config.ruleset));

    info!("Activating current blacklist...");
    let count = activate_current(store.as_ref(), activator).await?;

    println!(
        "[OK] {} entries active, ruleset at {}",
        count,
        config.ruleset.path.display()
    );
    Ok(())
}
