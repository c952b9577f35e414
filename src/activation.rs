//! Single activation worker with coalescing triggers.
//!
//! Triggers bump a generation counter on a `watch` channel. The worker wakes
//! on a change, takes the latest generation, and activates the blacklist as it
//! is in the store at that moment. Triggers that arrive while an activation is
//! running collapse into one follow-up activation.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::activator::Activator;
use crate::compiler::compile;
use crate::error::SyncError;
use crate::store::Store;

/// Progress of the activation worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationStatus {
    /// Highest trigger generation an activation has finished for
    pub completed: u64,
    pub succeeded: u64,
    pub failures: u64,
    /// Error of the latest activation, cleared by the next success
    pub last_error: Option<String>,
}

/// Sending side of the worker, shared by the scheduler and the CLI.
#[derive(Clone)]
pub struct ActivationHandle {
    trigger: Arc<watch::Sender<u64>>,
    status: watch::Receiver<ActivationStatus>,
}

impl ActivationHandle {
    /// Request an activation without waiting for it.
    ///
    /// Returns the generation to pass to [`ActivationHandle::settled`].
    pub fn trigger(&self) -> u64 {
        let mut generation = 0;
        self.trigger.send_modify(|g| {
            *g += 1;
            generation = *g;
        });
        debug!(generation, "Activation requested");
        generation
    }

    pub fn status(&self) -> ActivationStatus {
        self.status.borrow().clone()
    }

    /// True when the latest activation failed and nothing newer is queued.
    pub fn needs_retry(&self) -> bool {
        let requested = *self.trigger.borrow();
        let status = self.status.borrow();
        status.last_error.is_some() && status.completed >= requested
    }

    /// Wait until an activation covering `generation` has finished.
    ///
    /// Returns early with the last known status if the worker has stopped.
    pub async fn settled(&self, generation: u64) -> ActivationStatus {
        let mut rx = self.status.clone();
        let result = rx
            .wait_for(|s| s.completed >= generation)
            .await
            .map(|s| s.clone());
        result.unwrap_or_else(|_| rx.borrow().clone())
    }
}

/// Compile the current blacklist and make it live. Returns the element count.
pub async fn activate_current(
    store: &dyn Store,
    activator: Arc<dyn Activator>,
) -> Result<usize, SyncError> {
    let ips = store
        .list_ips()
        .await
        .map_err(|e| SyncError::storage("list blacklist", e))?;
    let count = ips.len();
    let ruleset = compile(&ips);

    // nft is a blocking process call
    tokio::task::spawn_blocking(move || activator.activate(&ruleset))
        .await
        .map_err(|e| SyncError::Firewall(format!("Activation task failed: {}", e)))??;

    Ok(count)
}

/// The only code path that flushes and loads the ruleset while the daemon runs.
pub struct ActivationWorker {
    store: Arc<dyn Store>,
    activator: Arc<dyn Activator>,
    trigger_rx: watch::Receiver<u64>,
    status_tx: watch::Sender<ActivationStatus>,
}

impl ActivationWorker {
    /// Start the worker task. It stops when `cancel` fires or every handle is dropped.
    pub fn spawn(
        store: Arc<dyn Store>,
        activator: Arc<dyn Activator>,
        cancel: CancellationToken,
    ) -> (ActivationHandle, JoinHandle<()>) {
        let (trigger_tx, trigger_rx) = watch::channel(0u64);
        let (status_tx, status_rx) = watch::channel(ActivationStatus::default());

        let worker = Self {
            store,
            activator,
            trigger_rx,
            status_tx,
        };
        let task = tokio::spawn(worker.run(cancel));

        let handle = ActivationHandle {
            trigger: Arc::new(trigger_tx),
            status: status_rx,
        };
        (handle, task)
    }

    async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = self.trigger_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let generation = *self.trigger_rx.borrow_and_update();
            let result = activate_current(self.store.as_ref(), self.activator.clone()).await;

            match &result {
                Ok(count) => info!(generation, ips = *count, "Blacklist activated"),
                Err(e) => error!(generation, error = %e, "Activation failed"),
            }

            self.status_tx.send_modify(|status| {
                status.completed = generation;
                match result {
                    Ok(_) => {
                        status.succeeded += 1;
                        status.last_error = None;
                    }
                    Err(e) => {
                        status.failures += 1;
                        status.last_error = Some(e.to_string());
                    }
                }
            });
        }
        debug!("Activation worker stopped");
    }
}
