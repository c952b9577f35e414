//! Sync scheduler: drives one fetch/reconcile cycle per interval.
//!
//! Cycles run sequentially on a single task and never overlap. The first
//! cycle starts immediately; every later one waits the full interval whether
//! the previous cycle succeeded or failed.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::activation::ActivationHandle;
use crate::clock::Clock;
use crate::error::SyncError;
use crate::fetcher::DeltaSource;
use crate::model::{Category, Cursor};
use crate::reconcile::{ChangeSummary, ReconciliationEngine};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Syncing,
}

/// Result of one successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub summary: ChangeSummary,
    /// Generation of the activation this cycle requested, if any
    pub activation: Option<u64>,
}

pub struct SyncScheduler {
    source: Arc<dyn DeltaSource>,
    store: Arc<dyn Store>,
    engine: ReconciliationEngine,
    clock: Arc<dyn Clock>,
    activation: Option<ActivationHandle>,
    interval: Duration,
    max_storage_failures: u32,
    state: watch::Sender<SchedulerState>,
}

impl SyncScheduler {
    pub fn new(
        source: Arc<dyn DeltaSource>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            source,
            engine: ReconciliationEngine::new(store.clone()),
            store,
            clock,
            activation: None,
            interval,
            max_storage_failures: 5,
            state,
        }
    }

    /// Send activation triggers to this worker when the blacklist changes.
    pub fn with_activation(mut self, handle: ActivationHandle) -> Self {
        self.activation = Some(handle);
        self
    }

    pub fn with_max_storage_failures(mut self, max: u32) -> Self {
        self.max_storage_failures = max.max(1);
        self
    }

    pub fn state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Run a single cycle: read cursor, fetch, reconcile, maybe trigger activation.
    pub async fn run_once(&self) -> Result<CycleReport, SyncError> {
        self.state.send_replace(SchedulerState::Syncing);
        let result = self.cycle().await;
        self.state.send_replace(SchedulerState::Idle);
        result
    }

    async fn cycle(&self) -> Result<CycleReport, SyncError> {
        let cursor = self
            .store
            .read_cursor()
            .await
            .map_err(|e| SyncError::storage("read cursor", e))?;

        match cursor {
            Some(c) => debug!(cursor = %c, "Starting sync cycle"),
            None => debug!("Starting first sync cycle"),
        }

        let payload = self.source.fetch(cursor).await?;
        let summary = self
            .engine
            .apply(&payload, Cursor::new(self.clock.now()))
            .await?;

        // Triggered, never awaited: the next cycle does not wait for nft
        let activation = match &self.activation {
            Some(handle) if summary.ips_changed() => Some(handle.trigger()),
            Some(handle) if handle.needs_retry() => {
                warn!("Previous activation failed, retrying");
                Some(handle.trigger())
            }
            _ => None,
        };

        Ok(CycleReport {
            summary,
            activation,
        })
    }

    /// Run cycles until `cancel` fires.
    ///
    /// Fetch failures are logged and retried after the interval. Storage
    /// failures skip the cycle; after `max_storage_failures` in a row the
    /// last one is returned.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), SyncError> {
        let mut storage_failures = 0u32;

        info!(interval_secs = self.interval.as_secs(), "Scheduler started");

        while !cancel.is_cancelled() {
            match self.run_once().await {
                Ok(report) => {
                    storage_failures = 0;
                    log_report(&report);
                }
                Err(e) if e.is_recoverable() => {
                    warn!(error = %e, "Fetch failed, retrying after interval");
                }
                Err(e @ SyncError::Storage(_)) => {
                    storage_failures += 1;
                    error!(
                        error = %e,
                        consecutive = storage_failures,
                        max = self.max_storage_failures,
                        "Storage failure, cycle skipped"
                    );
                    if storage_failures >= self.max_storage_failures {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.clock.sleep(self.interval) => {}
            }
        }

        info!("Scheduler stopped");
        Ok(())
    }
}

fn log_report(report: &CycleReport) {
    let summary = &report.summary;
    let changed = Category::ALL
        .iter()
        .any(|c| summary.category(*c).changed());

    if changed {
        info!(
            signatures_added = summary.signatures.inserted,
            signatures_removed = summary.signatures.removed,
            rules_added = summary.rules.inserted,
            rules_removed = summary.rules.removed,
            ips_added = summary.ips.inserted,
            ips_removed = summary.ips.removed,
            activation = ?report.activation,
            "Sync cycle complete"
        );
    } else {
        debug!(cursor = ?summary.cursor.map(|c| c.to_string()), "No changes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationWorker;
    use crate::activator::MockActivator;
    use crate::fetcher::MockDeltaSource;
    use crate::model::UpdatePayload;
    use crate::store::{MemoryStore, MockStore};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use mockall::predicate::eq;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    const INTERVAL: Duration = Duration::from_secs(3600);

    /// Advances one second per `now()` call; `sleep` only records and yields.
    struct FakeClock {
        secs: AtomicI64,
        sleeps: Mutex<Vec<Duration>>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                secs: AtomicI64::new(1_700_000_000),
                sleeps: Mutex::new(Vec::new()),
            }
        }

        fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Clock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            let secs = self.secs.fetch_add(1, Ordering::SeqCst);
            Utc.timestamp_opt(secs, 0).unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
            tokio::task::yield_now().await;
        }
    }

    /// Replays scripted responses and cancels the run once they are exhausted.
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<UpdatePayload, SyncError>>>,
        cursors: Mutex<Vec<Option<Cursor>>>,
        cancel: CancellationToken,
    }

    impl ScriptedSource {
        fn new(
            responses: Vec<Result<UpdatePayload, SyncError>>,
            cancel: CancellationToken,
        ) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                cursors: Mutex::new(Vec::new()),
                cancel,
            }
        }
    }

    #[async_trait]
    impl DeltaSource for ScriptedSource {
        async fn fetch(&self, cursor: Option<Cursor>) -> Result<UpdatePayload, SyncError> {
            self.cursors.lock().unwrap().push(cursor);
            let mut responses = self.responses.lock().unwrap();
            let next = responses.pop_front().unwrap_or_else(|| Ok(UpdatePayload::default()));
            if responses.is_empty() {
                self.cancel.cancel();
            }
            next
        }
    }

    fn payload(value: serde_json::Value) -> UpdatePayload {
        serde_json::from_value(value).unwrap()
    }

    fn http_500() -> SyncError {
        SyncError::Http {
            status: 500,
            url: "http://intel.example/api/database/updates".into(),
        }
    }

    #[tokio::test]
    async fn test_first_cycle_without_cursor_then_with() {
        let store = Arc::new(MemoryStore::new());
        let mut source = MockDeltaSource::new();
        source
            .expect_fetch()
            .with(eq(None))
            .times(1)
            .returning(|_| Ok(payload(json!({"malwareSignatures": [{"signature": "s"}]}))));
        source
            .expect_fetch()
            .withf(|c| c.is_some())
            .times(1)
            .returning(|_| Ok(UpdatePayload::default()));

        let scheduler = SyncScheduler::new(
            Arc::new(source),
            store.clone(),
            Arc::new(FakeClock::new()),
            INTERVAL,
        );

        let first = scheduler.run_once().await.unwrap();
        assert!(first.summary.cursor.is_some());
        let second = scheduler.run_once().await.unwrap();
        assert!(second.summary.cursor.is_none());
        assert_eq!(store.snapshot(Category::MalwareSignatures), vec!["s"]);
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_store_untouched() {
        let store = Arc::new(MemoryStore::new().with_values(Category::BlacklistedIps, ["1.2.3.4"]));
        let mut source = MockDeltaSource::new();
        source.expect_fetch().returning(|_| Err(http_500()));

        let scheduler = SyncScheduler::new(
            Arc::new(source),
            store.clone(),
            Arc::new(FakeClock::new()),
            INTERVAL,
        );

        let err = scheduler.run_once().await.unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(store.mutations(), 0);
        assert!(store.read_cursor().await.unwrap().is_none());
        assert_eq!(*scheduler.state().borrow(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_run_retries_after_fetch_failure_with_same_interval() {
        let cancel = CancellationToken::new();
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FakeClock::new());
        let source = Arc::new(ScriptedSource::new(
            vec![
                Err(http_500()),
                Err(SyncError::Network("connection refused".into())),
                Ok(payload(json!({"yaraRules": [{"rule": "r"}]}))),
            ],
            cancel.clone(),
        ));

        let scheduler = SyncScheduler::new(source.clone(), store.clone(), clock.clone(), INTERVAL);
        scheduler.run(cancel).await.unwrap();

        assert_eq!(source.cursors.lock().unwrap().len(), 3);
        assert_eq!(clock.sleeps(), vec![INTERVAL, INTERVAL]);
        assert_eq!(store.snapshot(Category::YaraRules), vec!["r"]);
    }

    #[tokio::test]
    async fn test_run_passes_advanced_cursor() {
        let cancel = CancellationToken::new();
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(ScriptedSource::new(
            vec![
                Ok(payload(json!({"malwareSignatures": [{"signature": "a"}]}))),
                Ok(payload(json!({"malwareSignatures": []}))),
                Ok(UpdatePayload::default()),
            ],
            cancel.clone(),
        ));

        let scheduler = SyncScheduler::new(
            source.clone(),
            store.clone(),
            Arc::new(FakeClock::new()),
            INTERVAL,
        );
        scheduler.run(cancel).await.unwrap();

        let cursors = source.cursors.lock().unwrap().clone();
        assert_eq!(cursors[0], None);
        assert!(cursors[1].is_some());
        // Empty payload: cursor unchanged
        assert_eq!(cursors[1], cursors[2]);
        assert_eq!(store.cursor_log().len(), 1);
    }

    #[tokio::test]
    async fn test_storage_failures_end_run_after_limit() {
        let mut store = MockStore::new();
        store
            .expect_read_cursor()
            .times(3)
            .returning(|| Err(anyhow::anyhow!("connection refused")));
        let source = MockDeltaSource::new();
        let clock = Arc::new(FakeClock::new());

        let scheduler = SyncScheduler::new(Arc::new(source), Arc::new(store), clock.clone(), INTERVAL)
            .with_max_storage_failures(3);

        let err = scheduler.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[tokio::test]
    async fn test_storage_failure_counter_resets_on_success() {
        let cancel = CancellationToken::new();
        let mut store = MockStore::new();
        let mut seq = mockall::Sequence::new();
        for fail in [true, true, false, true, true, false] {
            store
                .expect_read_cursor()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move || {
                    if fail {
                        Err(anyhow::anyhow!("timeout"))
                    } else {
                        Ok(None)
                    }
                });
        }
        let source = Arc::new(ScriptedSource::new(
            vec![Ok(UpdatePayload::default()), Ok(UpdatePayload::default())],
            cancel.clone(),
        ));

        let scheduler = SyncScheduler::new(
            source,
            Arc::new(store),
            Arc::new(FakeClock::new()),
            INTERVAL,
        )
        .with_max_storage_failures(3);

        scheduler.run(cancel).await.unwrap();
    }

    #[tokio::test]
    async fn test_ip_change_triggers_activation() {
        let store = Arc::new(MemoryStore::new());
        let mut activator = MockActivator::new();
        activator
            .expect_activate()
            .withf(|ruleset| ruleset.contains("\t\t\t1.2.3.4\n"))
            .times(1)
            .returning(|_| Ok(()));
        let cancel = CancellationToken::new();
        let (handle, task) =
            ActivationWorker::spawn(store.clone(), Arc::new(activator), cancel.clone());

        let mut source = MockDeltaSource::new();
        source
            .expect_fetch()
            .returning(|_| Ok(payload(json!({"blacklistedIpAddresses": [{"ipAddress": "1.2.3.4"}]}))));

        let scheduler = SyncScheduler::new(
            Arc::new(source),
            store,
            Arc::new(FakeClock::new()),
            INTERVAL,
        )
        .with_activation(handle.clone());

        let report = scheduler.run_once().await.unwrap();
        let generation = report.activation.unwrap();
        let status = handle.settled(generation).await;
        assert_eq!(status.succeeded, 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_activation_retried_next_cycle() {
        let store = Arc::new(MemoryStore::new());
        let mut activator = MockActivator::new();
        let mut seq = mockall::Sequence::new();
        activator
            .expect_activate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(SyncError::Firewall("nft -f failed: busy".into())));
        activator
            .expect_activate()
            .withf(|ruleset| ruleset.contains("\t\t\t1.2.3.4\n"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let cancel = CancellationToken::new();
        let (handle, task) =
            ActivationWorker::spawn(store.clone(), Arc::new(activator), cancel.clone());

        let mut source = MockDeltaSource::new();
        source
            .expect_fetch()
            .with(eq(None))
            .times(1)
            .returning(|_| Ok(payload(json!({"blacklistedIpAddresses": [{"ipAddress": "1.2.3.4"}]}))));
        source
            .expect_fetch()
            .withf(|c| c.is_some())
            .returning(|_| Ok(UpdatePayload::default()));

        let scheduler = SyncScheduler::new(
            Arc::new(source),
            store,
            Arc::new(FakeClock::new()),
            INTERVAL,
        )
        .with_activation(handle.clone());

        let first = scheduler.run_once().await.unwrap();
        let status = handle.settled(first.activation.unwrap()).await;
        assert_eq!(status.failures, 1);

        // No blacklist change, but the failed activation is repeated
        let second = scheduler.run_once().await.unwrap();
        assert!(!second.summary.ips_changed());
        let status = handle.settled(second.activation.unwrap()).await;
        assert_eq!(status.succeeded, 1);
        assert!(status.last_error.is_none());

        // Healthy again: quiet cycles trigger nothing
        let third = scheduler.run_once().await.unwrap();
        assert!(third.activation.is_none());

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_non_ip_change_does_not_trigger() {
        let store = Arc::new(MemoryStore::new());
        let cancel = CancellationToken::new();
        // Any activation would panic on the unconfigured mock
        let (handle, task) =
            ActivationWorker::spawn(store.clone(), Arc::new(MockActivator::new()), cancel.clone());

        let mut source = MockDeltaSource::new();
        source
            .expect_fetch()
            .returning(|_| Ok(payload(json!({"malwareSignatures": [{"signature": "s"}]}))));

        let scheduler = SyncScheduler::new(
            Arc::new(source),
            store,
            Arc::new(FakeClock::new()),
            INTERVAL,
        )
        .with_activation(handle.clone());

        let report = scheduler.run_once().await.unwrap();
        assert!(report.activation.is_none());
        assert_eq!(handle.status().completed, 0);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let scheduler = SyncScheduler::new(
            Arc::new(MockDeltaSource::new()),
            Arc::new(MockStore::new()),
            Arc::new(FakeClock::new()),
            INTERVAL,
        );
        scheduler.run(cancel).await.unwrap();
    }

    #[tokio::test]
    async fn test_state_returns_to_idle() {
        let mut source = MockDeltaSource::new();
        source.expect_fetch().returning(|_| Ok(UpdatePayload::default()));
        let scheduler = SyncScheduler::new(
            Arc::new(source),
            Arc::new(MemoryStore::new()),
            Arc::new(FakeClock::new()),
            INTERVAL,
        );

        let mut state = scheduler.state();
        assert_eq!(*state.borrow_and_update(), SchedulerState::Idle);
        scheduler.run_once().await.unwrap();
        assert!(state.has_changed().unwrap());
        assert_eq!(*state.borrow(), SchedulerState::Idle);
    }
}
