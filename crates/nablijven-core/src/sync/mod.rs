//! Replays the pending-operations log against the remote API.
//!
//! A sweep walks the log oldest first and issues one request per operation,
//! sequentially. Accepted operations are removed; failed ones stay queued for
//! the next sweep. Remote failures never escape a sweep; only store failures
//! do. Delivery is at-least-once: the remote handlers are expected to treat
//! creates/updates as upserts and deleting an absent record as success.

mod connectivity;
mod retry;
mod status;

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::db::LocalStore;
use crate::error::Result;
use crate::models::PendingOperation;
use crate::remote::{RemoteApi, RemoteRequest, RemoteResult};

pub use connectivity::{
    ConnectivityObserver, ConnectivityProbe, ConnectivityState, HttpHealthProbe, ObserverConfig,
    StaticProbe, DEFAULT_PROBE_INTERVAL, DEFAULT_SWEEP_INTERVAL,
};
pub use retry::{Admission, AttemptTracker, Backoff, RetryPolicy, MAX_RETRY_DELAY};
pub use status::{StatusReporter, SyncState, SyncStatus, DEFAULT_STATUS_POLL_INTERVAL};

/// How a sweep ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepOutcome {
    Completed,
    /// Connectivity reported offline; nothing was sent
    Offline,
    /// Another sweep was already running
    AlreadyRunning,
}

/// Counts gathered during one sweep, for logging and the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub outcome: SweepOutcome,
    pub attempted: usize,
    pub applied: usize,
    pub failed: usize,
    /// Skipped while backing off
    pub deferred: usize,
    /// Skipped after reaching the retry limit
    pub exhausted: usize,
}

impl SyncReport {
    const fn new(outcome: SweepOutcome) -> Self {
        Self {
            outcome,
            attempted: 0,
            applied: 0,
            failed: 0,
            deferred: 0,
            exhausted: 0,
        }
    }

    #[must_use]
    pub const fn skipped(&self) -> bool {
        !matches!(self.outcome, SweepOutcome::Completed)
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome {
            SweepOutcome::Offline => write!(f, "skipped (offline)"),
            SweepOutcome::AlreadyRunning => write!(f, "skipped (sweep already running)"),
            SweepOutcome::Completed => {
                write!(
                    f,
                    "{} applied, {} failed of {} attempted",
                    self.applied, self.failed, self.attempted
                )?;
                if self.deferred > 0 {
                    write!(f, ", {} deferred", self.deferred)?;
                }
                if self.exhausted > 0 {
                    write!(f, ", {} exhausted", self.exhausted)?;
                }
                Ok(())
            }
        }
    }
}

/// Sync engine shared by the observer, the status reporter and the CLI.
pub struct SyncEngine {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteApi>,
    connectivity: ConnectivityState,
    policy: RetryPolicy,
    single_flight: bool,
    sweep_lock: Mutex<()>,
    attempts: Mutex<AttemptTracker>,
    active_sweeps: AtomicUsize,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteApi>,
        connectivity: ConnectivityState,
    ) -> Self {
        Self {
            store,
            remote,
            connectivity,
            policy: RetryPolicy::default(),
            single_flight: true,
            sweep_lock: Mutex::new(()),
            attempts: Mutex::new(AttemptTracker::default()),
            active_sweeps: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Allow overlapping sweeps. Each may then resend operations the other
    /// has not removed yet.
    #[must_use]
    pub const fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    pub fn remote(&self) -> &Arc<dyn RemoteApi> {
        &self.remote
    }

    #[must_use]
    pub const fn connectivity(&self) -> &ConnectivityState {
        &self.connectivity
    }

    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.active_sweeps.load(Ordering::SeqCst) > 0
    }

    /// Run one sweep over the log.
    pub async fn sync_pending_operations(&self) -> Result<SyncReport> {
        if !self.connectivity.is_online() {
            tracing::debug!("Offline, skipping sync sweep");
            return Ok(SyncReport::new(SweepOutcome::Offline));
        }

        let _flight = if self.single_flight {
            if let Ok(guard) = self.sweep_lock.try_lock() {
                Some(guard)
            } else {
                tracing::debug!("Sync sweep already running, skipping");
                return Ok(SyncReport::new(SweepOutcome::AlreadyRunning));
            }
        } else {
            None
        };
        let _active = ActiveSweep::enter(&self.active_sweeps);

        let operations = self.store.pending_operations().await?;
        {
            let queued = operations.iter().map(|op| op.id).collect::<HashSet<_>>();
            self.attempts.lock().await.retain_queued(&queued);
        }

        let mut report = SyncReport::new(SweepOutcome::Completed);
        for operation in &operations {
            let admission = self
                .attempts
                .lock()
                .await
                .admit(&self.policy, operation.id, Instant::now());
            match admission {
                Admission::Ready => {}
                Admission::Deferred => {
                    report.deferred += 1;
                    continue;
                }
                Admission::Exhausted => {
                    report.exhausted += 1;
                    continue;
                }
            }

            report.attempted += 1;
            match self.replay(operation).await {
                Ok(()) => {
                    self.attempts.lock().await.record_success(operation.id);
                    if let Err(error) = self.store.remove_pending(operation.id).await {
                        report.failed += 1;
                        tracing::warn!(
                            "Pending operation #{} was applied but could not be removed, it will be resent: {}",
                            operation.id,
                            error
                        );
                        continue;
                    }
                    report.applied += 1;
                    tracing::debug!(
                        "Applied pending operation #{} ({} {})",
                        operation.id,
                        operation.op_type,
                        operation.entity
                    );
                }
                Err(error) => {
                    let failures = self.attempts.lock().await.record_failure(
                        &self.policy,
                        operation.id,
                        Instant::now(),
                    );
                    report.failed += 1;
                    tracing::warn!(
                        "Replaying pending operation #{} ({} {}) failed, attempt {}: {}",
                        operation.id,
                        operation.op_type,
                        operation.entity,
                        failures,
                        error
                    );
                }
            }
        }

        if report.attempted > 0 || report.exhausted > 0 {
            tracing::info!("Sync sweep finished: {}", report);
        }
        Ok(report)
    }

    async fn replay(&self, operation: &PendingOperation) -> RemoteResult<()> {
        let request = RemoteRequest::for_operation(operation)?;
        tracing::debug!("Replaying #{}: {}", operation.id, request);
        self.remote.execute(&request).await.map(|_| ())
    }
}

struct ActiveSweep<'a>(&'a AtomicUsize);

impl<'a> ActiveSweep<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveSweep<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::db::{MemoryStore, SqliteStore};
    use crate::models::{DayOfWeek, Detention, EntityKind, NewPendingOperation, Student};
    use crate::test_support::{FlakyStore, MockRemote};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn engine(store: Arc<dyn LocalStore>, remote: Arc<MockRemote>, online: bool) -> SyncEngine {
        SyncEngine::new(store, remote, ConnectivityState::new(online))
    }

    fn detention(id: &str, number: u32) -> Detention {
        Detention::new(id, number, "2024-09-16", DayOfWeek::Maandag, "Jan - 2A")
    }

    async fn enqueue_mixed(store: &dyn LocalStore) {
        let student = Student::new("s1", "Jan", "2A", DayOfWeek::Maandag);
        store
            .append(NewPendingOperation::create_student(&student).unwrap())
            .await
            .unwrap();
        store
            .append(NewPendingOperation::create_detention(&detention("d1", 1)).unwrap())
            .await
            .unwrap();
        store
            .append(NewPendingOperation::update_detention(&detention("d1", 2)).unwrap())
            .await
            .unwrap();
        store
            .append(NewPendingOperation::delete(EntityKind::Student, "s9").unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn successful_sweep_empties_the_queue() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        enqueue_mixed(store.as_ref()).await;
        let remote = Arc::new(MockRemote::new());

        let report = engine(store.clone(), remote.clone(), true)
            .sync_pending_operations()
            .await
            .unwrap();

        assert_eq!(report.applied, 4);
        assert_eq!(report.failed, 0);
        assert!(store.pending_operations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn successful_sweep_empties_an_sqlite_queue() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn LocalStore> = Arc::new(SqliteStore::new(dir.path().join("sync.db")));
        enqueue_mixed(store.as_ref()).await;

        engine(store.clone(), Arc::new(MockRemote::new()), true)
            .sync_pending_operations()
            .await
            .unwrap();

        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn replays_in_fifo_order() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        store
            .append(NewPendingOperation::create_detention(&detention("d7", 1)).unwrap())
            .await
            .unwrap();
        store
            .append(NewPendingOperation::update_detention(&detention("d7", 2)).unwrap())
            .await
            .unwrap();
        store
            .append(NewPendingOperation::delete(EntityKind::Detention, "d7").unwrap())
            .await
            .unwrap();
        let remote = Arc::new(MockRemote::new());

        engine(store, remote.clone(), true)
            .sync_pending_operations()
            .await
            .unwrap();

        assert_eq!(
            remote.calls(),
            vec![
                "POST /detentions".to_string(),
                "PUT /detentions".to_string(),
                "DELETE /detentions?id=d7".to_string(),
            ]
        );
        assert_eq!(remote.bodies()[1]["number"], 2);
    }

    #[tokio::test]
    async fn offline_sweep_sends_nothing() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        enqueue_mixed(store.as_ref()).await;
        let before = store.pending_operations().await.unwrap();
        let remote = Arc::new(MockRemote::new());

        let report = engine(store.clone(), remote.clone(), false)
            .sync_pending_operations()
            .await
            .unwrap();

        assert_eq!(report.outcome, SweepOutcome::Offline);
        assert!(remote.calls().is_empty());
        assert_eq!(store.pending_operations().await.unwrap(), before);
    }

    #[tokio::test]
    async fn failed_operation_does_not_block_later_ones() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        store
            .append(NewPendingOperation::create_detention(&detention("a", 1)).unwrap())
            .await
            .unwrap();
        store
            .append(NewPendingOperation::create_detention(&detention("b", 2)).unwrap())
            .await
            .unwrap();
        let remote = Arc::new(MockRemote::new());
        remote.fail_record("a");

        let report = engine(store.clone(), remote.clone(), true)
            .sync_pending_operations()
            .await
            .unwrap();

        assert_eq!((report.applied, report.failed), (1, 1));
        let remaining = store.pending_operations().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].record_id(), Some("a"));
        assert_eq!(remote.calls().len(), 2);
    }

    #[tokio::test]
    async fn network_failure_keeps_operation_queued() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        enqueue_mixed(store.as_ref()).await;
        let remote = Arc::new(MockRemote::new());
        remote.set_network_down(true);

        let report = engine(store.clone(), remote, true)
            .sync_pending_operations()
            .await
            .unwrap();

        assert_eq!(report.failed, 4);
        assert_eq!(store.pending_count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::unavailable());
        let error = engine(store, Arc::new(MockRemote::new()), true)
            .sync_pending_operations()
            .await
            .unwrap_err();
        assert!(error.is_storage_unavailable());
    }

    #[tokio::test]
    async fn failed_removal_does_not_stop_the_sweep() {
        let store = Arc::new(FlakyStore::new());
        let first = store
            .append(NewPendingOperation::delete(EntityKind::Detention, "a").unwrap())
            .await
            .unwrap();
        store
            .append(NewPendingOperation::delete(EntityKind::Detention, "b").unwrap())
            .await
            .unwrap();
        store.fail_removal_once(first);
        let remote = Arc::new(MockRemote::new());
        let engine = engine(store.clone(), remote.clone(), true);

        let report = engine.sync_pending_operations().await.unwrap();

        assert_eq!((report.applied, report.failed), (1, 1));
        assert_eq!(
            remote.calls(),
            vec![
                "DELETE /detentions?id=a".to_string(),
                "DELETE /detentions?id=b".to_string(),
            ]
        );
        let remaining = store.pending_operations().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, first);

        let retry = engine.sync_pending_operations().await.unwrap();
        assert_eq!(retry.applied, 1);
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn overlapping_sweeps_deliver_at_least_once() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        enqueue_mixed(store.as_ref()).await;
        let remote = Arc::new(MockRemote::new().with_delay(Duration::from_millis(20)));
        let engine = Arc::new(
            engine(store.clone(), remote.clone(), true).with_single_flight(false),
        );

        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.sync_pending_operations().await }
        });
        let second = tokio::spawn({
            let engine = engine.clone();
            async move { engine.sync_pending_operations().await }
        });
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let calls = remote.calls();
        for expected in [
            "POST /students",
            "POST /detentions",
            "PUT /detentions",
            "DELETE /students?id=s9",
        ] {
            assert!(calls.iter().any(|call| call == expected), "{expected} missing");
        }
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn single_flight_skips_concurrent_sweep() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        enqueue_mixed(store.as_ref()).await;
        let remote = Arc::new(MockRemote::new().with_delay(Duration::from_millis(50)));
        let engine = Arc::new(engine(store.clone(), remote.clone(), true));

        let running = tokio::spawn({
            let engine = engine.clone();
            async move { engine.sync_pending_operations().await }
        });
        while !engine.is_syncing() {
            tokio::task::yield_now().await;
        }

        let skipped = engine.sync_pending_operations().await.unwrap();
        assert_eq!(skipped.outcome, SweepOutcome::AlreadyRunning);

        let report = running.await.unwrap().unwrap();
        assert_eq!(report.applied, 4);
        assert_eq!(remote.calls().len(), 4);
        assert!(!engine.is_syncing());
    }

    #[tokio::test]
    async fn retry_limit_skips_exhausted_operations() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        store
            .append(NewPendingOperation::delete(EntityKind::Detention, "d42").unwrap())
            .await
            .unwrap();
        let remote = Arc::new(MockRemote::new());
        remote.fail_record("d42");
        let engine = engine(store.clone(), remote.clone(), true)
            .with_retry_policy(RetryPolicy::unbounded().with_max_attempts(2));

        engine.sync_pending_operations().await.unwrap();
        engine.sync_pending_operations().await.unwrap();
        let report = engine.sync_pending_operations().await.unwrap();

        assert_eq!(report.exhausted, 1);
        assert_eq!(report.attempted, 0);
        assert_eq!(remote.calls().len(), 2);
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_defers_retries() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        store
            .append(NewPendingOperation::delete(EntityKind::Student, "s1").unwrap())
            .await
            .unwrap();
        let remote = Arc::new(MockRemote::new());
        remote.fail_record("s1");
        let engine = engine(store.clone(), remote.clone(), true).with_retry_policy(
            RetryPolicy::unbounded().with_backoff(
                Backoff::new(Duration::from_secs(60), Duration::from_secs(600)).without_jitter(),
            ),
        );

        engine.sync_pending_operations().await.unwrap();
        let deferred = engine.sync_pending_operations().await.unwrap();
        assert_eq!(deferred.deferred, 1);

        remote.clear_failures();
        tokio::time::advance(Duration::from_secs(61)).await;
        let report = engine.sync_pending_operations().await.unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn end_to_end_delete_detention() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        store
            .append(NewPendingOperation::delete(EntityKind::Detention, "d42").unwrap())
            .await
            .unwrap();
        let remote = Arc::new(MockRemote::new());

        engine(store.clone(), remote.clone(), true)
            .sync_pending_operations()
            .await
            .unwrap();

        assert_eq!(remote.calls(), vec!["DELETE /detentions?id=d42".to_string()]);
        assert_eq!(remote.bodies(), vec![json!(null)]);
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[test]
    fn report_display_mentions_skips() {
        let mut report = SyncReport::new(SweepOutcome::Completed);
        report.attempted = 3;
        report.applied = 2;
        report.failed = 1;
        report.exhausted = 1;
        assert_eq!(report.to_string(), "2 applied, 1 failed of 3 attempted, 1 exhausted");
        assert_eq!(
            SyncReport::new(SweepOutcome::Offline).to_string(),
            "skipped (offline)"
        );
    }
}
