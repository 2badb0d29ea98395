//! Read-side sync status for user interfaces

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{SyncEngine, SyncReport};
use crate::error::Result;

pub const DEFAULT_STATUS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Coarse state shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Offline,
    Pending,
    Syncing,
    Synced,
}

/// Point-in-time projection of connectivity and queue state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub online: bool,
    pub pending_count: usize,
    pub syncing: bool,
    /// `false` when the local store could not be read
    pub store_available: bool,
}

impl SyncStatus {
    #[must_use]
    pub const fn state(&self) -> SyncState {
        if !self.online || !self.store_available {
            SyncState::Offline
        } else if self.syncing {
            SyncState::Syncing
        } else if self.pending_count > 0 {
            SyncState::Pending
        } else {
            SyncState::Synced
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        match self.state() {
            SyncState::Offline => "Offline".to_string(),
            SyncState::Syncing => "Synchroniseren".to_string(),
            SyncState::Pending => {
                let suffix = if self.pending_count == 1 { "" } else { "s" };
                format!("{} operatie{suffix} wachten", self.pending_count)
            }
            SyncState::Synced => "Gesynchroniseerd".to_string(),
        }
    }

    #[must_use]
    pub const fn detail(&self) -> Option<&'static str> {
        match self.state() {
            SyncState::Offline => Some("Wijzigingen worden lokaal opgeslagen"),
            SyncState::Pending | SyncState::Syncing => Some("Op synchronisatie"),
            SyncState::Synced => None,
        }
    }

    /// Whether the indicator should be shown at all: hidden when online with
    /// an empty queue.
    #[must_use]
    pub const fn needs_attention(&self) -> bool {
        !(self.online && self.store_available && self.pending_count == 0)
    }
}

pub struct StatusReporter {
    engine: Arc<SyncEngine>,
    sender: watch::Sender<SyncStatus>,
}

impl StatusReporter {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        let initial = SyncStatus {
            online: engine.connectivity().is_online(),
            pending_count: 0,
            syncing: false,
            store_available: true,
        };
        let (sender, _receiver) = watch::channel(initial);
        Self { engine, sender }
    }

    /// Read connectivity and the pending count without publishing.
    pub async fn snapshot(&self) -> SyncStatus {
        let online = self.engine.connectivity().is_online();
        let syncing = self.engine.is_syncing();
        match self.engine.store().pending_count().await {
            Ok(pending_count) => SyncStatus {
                online,
                pending_count,
                syncing,
                store_available: true,
            },
            Err(error) => {
                tracing::error!("Failed to count pending operations: {}", error);
                SyncStatus {
                    online: false,
                    pending_count: 0,
                    syncing: false,
                    store_available: false,
                }
            }
        }
    }

    /// Take a snapshot and publish it to subscribers.
    pub async fn refresh(&self) -> SyncStatus {
        let status = self.snapshot().await;
        self.sender.send_replace(status);
        status
    }

    #[must_use]
    pub fn current(&self) -> SyncStatus {
        *self.sender.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.sender.subscribe()
    }

    /// Manual sync: one sweep, then a fresh count.
    pub async fn trigger_sync(&self) -> Result<SyncReport> {
        self.sender.send_modify(|status| status.syncing = true);
        let result = self.engine.sync_pending_operations().await;
        if let Err(error) = &result {
            tracing::error!("Manual sync failed: {}", error);
        }
        self.refresh().await;
        result
    }

    /// Refresh now, then on every tick and on every connectivity change.
    pub fn spawn_polling(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut connectivity = self.engine.connectivity().subscribe();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = connectivity.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                self.refresh().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{LocalStore, MemoryStore};
    use crate::models::{EntityKind, NewPendingOperation};
    use crate::sync::ConnectivityState;
    use crate::test_support::MockRemote;
    use pretty_assertions::assert_eq;

    fn status(online: bool, pending_count: usize, syncing: bool) -> SyncStatus {
        SyncStatus {
            online,
            pending_count,
            syncing,
            store_available: true,
        }
    }

    fn reporter(store: Arc<dyn LocalStore>, online: bool) -> (Arc<StatusReporter>, Arc<SyncEngine>) {
        let engine = Arc::new(SyncEngine::new(
            store,
            Arc::new(MockRemote::new()),
            ConnectivityState::new(online),
        ));
        (Arc::new(StatusReporter::new(engine.clone())), engine)
    }

    #[test]
    fn labels_follow_state() {
        assert_eq!(status(false, 3, false).label(), "Offline");
        assert_eq!(status(true, 1, false).label(), "1 operatie wachten");
        assert_eq!(status(true, 4, false).label(), "4 operaties wachten");
        assert_eq!(status(true, 0, false).label(), "Gesynchroniseerd");
        assert_eq!(status(true, 2, true).state(), SyncState::Syncing);
        assert_eq!(
            status(false, 0, false).detail(),
            Some("Wijzigingen worden lokaal opgeslagen")
        );
    }

    #[test]
    fn indicator_hidden_when_online_and_empty() {
        assert!(!status(true, 0, false).needs_attention());
        assert!(status(true, 1, false).needs_attention());
        assert!(status(false, 0, false).needs_attention());
    }

    #[tokio::test]
    async fn snapshot_counts_pending_operations() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        store
            .append(NewPendingOperation::delete(EntityKind::Student, "s1").unwrap())
            .await
            .unwrap();
        let (reporter, _engine) = reporter(store, false);

        assert_eq!(reporter.snapshot().await, status(false, 1, false));
    }

    #[tokio::test]
    async fn unavailable_store_degrades_to_offline() {
        let (reporter, _engine) = reporter(Arc::new(MemoryStore::unavailable()), true);

        let snapshot = reporter.refresh().await;
        assert_eq!(snapshot.state(), SyncState::Offline);
        assert!(!snapshot.store_available);
        assert_eq!(reporter.current(), snapshot);
    }

    #[tokio::test]
    async fn trigger_sync_refreshes_count() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        store
            .append(NewPendingOperation::delete(EntityKind::Detention, "d1").unwrap())
            .await
            .unwrap();
        let (reporter, _engine) = reporter(store, true);
        assert_eq!(reporter.refresh().await.pending_count, 1);

        let report = reporter.trigger_sync().await.unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(reporter.current(), status(true, 0, false));
    }

    #[tokio::test(start_paused = true)]
    async fn polling_publishes_new_counts() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        let (reporter, engine) = reporter(store.clone(), false);
        let mut updates = reporter.subscribe();
        let poller = reporter.clone().spawn_polling(DEFAULT_STATUS_POLL_INTERVAL);

        store
            .append(NewPendingOperation::delete(EntityKind::Student, "s1").unwrap())
            .await
            .unwrap();
        tokio::time::sleep(DEFAULT_STATUS_POLL_INTERVAL + Duration::from_millis(1)).await;
        updates.changed().await.unwrap();
        assert_eq!(updates.borrow_and_update().pending_count, 1);

        engine.connectivity().set(true);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(reporter.current().online);

        poller.abort();
    }
}
