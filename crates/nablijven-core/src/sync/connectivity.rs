//! Online/offline belief and the observer task that drives sync sweeps

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::SyncEngine;
use crate::remote::{RemoteApi, RemoteError, RemoteRequest};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(10);

/// Shared online/offline flag.
///
/// Cloning is cheap; every clone observes the same value. Subscribers are
/// only woken by real transitions.
#[derive(Debug, Clone)]
pub struct ConnectivityState {
    sender: Arc<watch::Sender<bool>>,
}

impl ConnectivityState {
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (sender, _receiver) = watch::channel(online);
        Self {
            sender: Arc::new(sender),
        }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// Record the current belief. Returns `true` when this was a transition.
    pub fn set(&self, online: bool) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        })
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// Source of the platform connectivity signal
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn probe(&self) -> bool;
}

/// Treats the API as reachable when `GET /health` gets any HTTP response.
pub struct HttpHealthProbe {
    api: Arc<dyn RemoteApi>,
}

impl HttpHealthProbe {
    pub fn new(api: Arc<dyn RemoteApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ConnectivityProbe for HttpHealthProbe {
    async fn probe(&self) -> bool {
        match self.api.execute(&RemoteRequest::health()).await {
            Ok(_) | Err(RemoteError::Rejected { .. } | RemoteError::InvalidPayload(_)) => true,
            Err(error) => {
                tracing::debug!("Health probe failed: {}", error);
                false
            }
        }
    }
}

/// Fixed answer, switchable at runtime. Used for `--offline` and tests.
#[derive(Debug, Default)]
pub struct StaticProbe {
    online: AtomicBool,
}

impl StaticProbe {
    #[must_use]
    pub const fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityProbe for StaticProbe {
    async fn probe(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverConfig {
    pub sweep_interval: Duration,
    pub probe_interval: Duration,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            probe_interval: DEFAULT_PROBE_INTERVAL,
        }
    }
}

/// Background task that keeps [`ConnectivityState`] current and triggers sweeps:
/// once per offline-to-online transition, plus on every sweep tick.
pub struct ConnectivityObserver {
    state: ConnectivityState,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ConnectivityObserver {
    /// Probe once to seed the state, then spawn the observer loop.
    pub async fn start(
        engine: Arc<SyncEngine>,
        probe: Arc<dyn ConnectivityProbe>,
        config: ObserverConfig,
    ) -> Self {
        let state = engine.connectivity().clone();
        let online = probe.probe().await;
        state.set(online);
        tracing::info!(
            "Connectivity observer started ({}), sweep every {}s",
            if online { "online" } else { "offline" },
            config.sweep_interval.as_secs()
        );

        let changes = state.subscribe();
        let was_online = *changes.borrow();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(observe(
            engine,
            probe,
            config,
            Watched {
                changes,
                was_online,
            },
            shutdown_rx,
        ));
        Self {
            state,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    #[must_use]
    pub fn state(&self) -> &ConnectivityState {
        &self.state
    }

    /// Report a platform online/offline event.
    pub fn set_online(&self, online: bool) {
        self.state.set(online);
    }

    /// Stop the loop and wait for an in-flight sweep to finish.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                tracing::error!("Connectivity observer task failed: {}", error);
            }
        }
    }
}

impl Drop for ConnectivityObserver {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// Connectivity receiver plus the state it had when the observer started.
struct Watched {
    changes: watch::Receiver<bool>,
    was_online: bool,
}

async fn observe(
    engine: Arc<SyncEngine>,
    probe: Arc<dyn ConnectivityProbe>,
    config: ObserverConfig,
    watched: Watched,
    mut shutdown: oneshot::Receiver<()>,
) {
    let state = engine.connectivity().clone();
    let Watched {
        mut changes,
        mut was_online,
    } = watched;

    let now = Instant::now();
    let mut sweep_timer = interval_at(now + config.sweep_interval, config.sweep_interval);
    sweep_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut probe_timer = interval_at(now + config.probe_interval, config.probe_interval);
    probe_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = sweep_timer.tick() => run_sweep(&engine, "timer").await,
            _ = probe_timer.tick() => {
                state.set(probe.probe().await);
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let online = *changes.borrow_and_update();
                if online == was_online {
                    continue;
                }
                was_online = online;
                if online {
                    tracing::info!("Connection restored, replaying pending operations");
                    run_sweep(&engine, "online").await;
                } else {
                    tracing::info!("Connection lost, queueing changes locally");
                }
            }
        }
    }
    tracing::debug!("Connectivity observer stopped");
}

async fn run_sweep(engine: &SyncEngine, trigger: &str) {
    match engine.sync_pending_operations().await {
        Ok(report) => tracing::debug!("Sync sweep ({trigger}): {report}"),
        Err(error) => tracing::error!("Sync sweep ({trigger}) failed: {}", error),
    }
}
