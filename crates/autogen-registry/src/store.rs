//! Atomic publication of registry snapshots.
//!
//! Readers call [`SnapshotStore::pin`] once per request and keep the returned
//! `Arc` for the whole request, so a refresh that lands mid-request never
//! changes what that request sees.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::provider::RegistryProvider;
use crate::snapshot::RegistrySnapshot;

type Published = Option<Arc<RegistrySnapshot>>;

/// Holds the most recent good snapshot and refreshes it from a provider.
pub struct SnapshotStore {
    provider: Arc<dyn RegistryProvider>,
    published: watch::Sender<Published>,
    refresh_lock: Mutex<()>,
}

impl SnapshotStore {
    pub fn new(provider: Arc<dyn RegistryProvider>) -> Self {
        let (published, _) = watch::channel(None);
        Self {
            provider,
            published,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Fetch fresh data and publish it as the next version.
    ///
    /// On failure the previously published snapshot stays in place and the
    /// error is returned to the caller.
    pub async fn refresh(&self) -> RegistryResult<Arc<RegistrySnapshot>> {
        let _guard = self.refresh_lock.lock().await;
        let next_version = self.version().map_or(1, |v| v + 1);
        let started = Instant::now();

        let built = match self.provider.fetch_snapshot().await {
            Ok(data) => RegistrySnapshot::build(data, next_version),
            Err(e) => Err(e),
        };

        match built {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.published.send_replace(Some(Arc::clone(&snapshot)));
                info!(
                    event = "snapshot.refreshed",
                    provider = %self.provider.describe(),
                    version = snapshot.version(),
                    digest = %snapshot.digest().short(),
                    entities = snapshot.entities().count(),
                    duration_ms = started.elapsed().as_millis() as u64,
                );
                Ok(snapshot)
            }
            Err(e) => {
                warn!(
                    event = "snapshot.refresh_failed",
                    provider = %self.provider.describe(),
                    retained_version = ?self.version(),
                    error = %e,
                );
                Err(e)
            }
        }
    }

    /// The currently published snapshot.
    pub fn current(&self) -> RegistryResult<Arc<RegistrySnapshot>> {
        self.published
            .borrow()
            .clone()
            .ok_or_else(|| RegistryError::NoInventory {
                reason: "no snapshot has been loaded".to_string(),
            })
    }

    /// Pin a snapshot for one request, loading the first one on demand.
    ///
    /// Returns `RegistryError::NoInventory` only when nothing was ever
    /// published and the on-demand fetch failed too.
    pub async fn pin(&self) -> RegistryResult<Arc<RegistrySnapshot>> {
        if let Ok(snapshot) = self.current() {
            return Ok(snapshot);
        }
        self.refresh().await.map_err(|e| match e {
            RegistryError::NoInventory { .. } => e,
            other => RegistryError::NoInventory {
                reason: other.to_string(),
            },
        })
    }

    /// Version of the published snapshot, if any.
    pub fn version(&self) -> Option<u64> {
        self.published.borrow().as_ref().map(|s| s.version())
    }

    /// Receive a notification each time a new snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<Published> {
        self.published.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Background refresher
// ---------------------------------------------------------------------------

/// Handle to a running background refresh task.
pub struct RefreshHandle {
    notify: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Ask the refresher to fetch now instead of waiting for the next tick.
    pub fn request_refresh(&self) {
        self.notify.notify_one();
    }

    /// Stop the refresher and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Spawn a task that refreshes `store` every `interval` and on demand.
///
/// The first refresh runs immediately. The task also stops when the handle
/// is dropped.
pub fn spawn_refresher(store: Arc<SnapshotStore>, interval: Duration) -> RefreshHandle {
    let notify = Arc::new(Notify::new());
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let wake = Arc::clone(&notify);
    let period = interval.max(Duration::from_millis(1));

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = wake.notified() => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
            }
            // Failures are logged inside refresh and keep the last good snapshot.
            let _ = store.refresh().await;
        }
        debug!("snapshot refresher stopped");
    });

    RefreshHandle {
        notify,
        shutdown,
        task,
    }
}
