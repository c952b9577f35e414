//! Sync command implementation: a single cycle.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{load_config, open_store, StoreKind};
use crate::activation::ActivationWorker;
use crate::activator::{check_root, RuleActivator};
use crate::clock::SystemClock;
use crate::fetcher::DeltaFetcher;
use crate::lock::LockGuard;
use crate::model::Category;
use crate::scheduler::SyncScheduler;

/// Run the sync command
pub async fn run(config_path: &Path, kind: StoreKind, no_activate: bool) -> Result<()> {
    if !no_activate {
        check_root()?;
    }

    let config = load_config(config_path)?;
    let _lock = LockGuard::acquire(&config.lock_file)?;

    let fetcher = Arc::new(DeltaFetcher::new(&config)?);
    let store = open_store(&config, kind).await?;
    store.migrate().await.context("Failed to prepare schema")?;

    let cancel = CancellationToken::new();
    let mut scheduler = SyncScheduler::new(
        fetcher,
        store.clone(),
        Arc::new(SystemClock),
        config.sync_interval()?,
    );

    let worker = if no_activate {
        None
    } else {
        let activator = Arc::new(RuleActivator::new(&config.ruleset));
        let (handle, task) = ActivationWorker::spawn(store, activator, cancel.clone());
        scheduler = scheduler.with_activation(handle.clone());
        Some((handle, task))
    };

    let report = scheduler.run_once().await.context("Sync failed")?;

    println!();
    for category in Category::ALL {
        let change = report.summary.category(category);
        println!(
            "{:<26} +{} -{}",
            category.to_string(),
            change.inserted,
            change.removed
        );
    }
    match report.summary.cursor {
        Some(cursor) => println!("Cursor advanced to {}", cursor),
        None => println!("No updates"),
    }

    let mut outcome = Ok(());
    if let Some((handle, task)) = worker {
        match report.activation {
            Some(generation) => {
                let status = handle.settled(generation).await;
                match status.last_error {
                    Some(e) => outcome = Err(anyhow::anyhow!("Activation failed: {}", e)),
                    None => println!("[OK] Ruleset activated"),
                }
            }
            None => println!("Blacklist unchanged, ruleset not reloaded"),
        }
        cancel.cancel();
        task.await.context("Activation worker panicked")?;
    } else if report.summary.ips_changed() {
        println!("Blacklist changed, activation skipped (--no-activate)");
    }

    outcome
}
