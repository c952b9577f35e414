//! Run command implementation: the long-lived daemon.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::{load_config, open_store, StoreKind};
use crate::activation::ActivationWorker;
use crate::activator::{check_root, RuleActivator};
use crate::clock::SystemClock;
use crate::fetcher::DeltaFetcher;
use crate::lock::LockGuard;
use crate::scheduler::SyncScheduler;
use crate::signal::shutdown_token;

/// Run the daemon until SIGINT/SIGTERM or a fatal storage failure
pub async fn run(config_path: &Path, kind: StoreKind) -> Result<()> {
    check_root()?;

    let config = load_config(config_path)?;
    let _lock = LockGuard::acquire(&config.lock_file)?;

    let interval = config.sync_interval()?;
    let fetcher = Arc::new(DeltaFetcher::new(&config)?);

    let store = open_store(&config, kind).await?;
    store.migrate().await.context("Failed to prepare schema")?;

    let cancel = shutdown_token();
    let activator = Arc::new(RuleActivator::new(&config.ruleset));
    let (activation, worker) = ActivationWorker::spawn(store.clone(), activator, cancel.clone());

    info!(
        api = %config.api_base_url,
        interval = %config.sync_interval,
        ruleset = %config.ruleset.path.display(),
        "intelsync started"
    );

    let scheduler = SyncScheduler::new(fetcher, store, Arc::new(SystemClock), interval)
        .with_activation(activation)
        .with_max_storage_failures(config.max_storage_failures);

    let result = scheduler.run(cancel.clone()).await;

    // Stop the worker too when the scheduler gave up
    cancel.cancel();
    if let Err(e) = worker.await {
        warn!("Activation worker ended abnormally: {}", e);
    }

    result.context("Sync loop stopped")?;
    info!("intelsync stopped");
    Ok(())
}
