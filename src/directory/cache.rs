/// Resolution Cache - Address to device lookup with refresh-on-miss
use crate::{
    config::{LookupMode, TailnetConfig},
    directory::{Device, DirectoryClient, DirectorySnapshot, SnapshotStore, TailscaleClient},
    error::{TailnetError, TailnetResult},
};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Refresh shared by every request that missed while it was running
type RefreshFuture = Shared<BoxFuture<'static, Result<Arc<DirectorySnapshot>, String>>>;

/// Summary of the snapshot currently being served
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotStats {
    pub devices: usize,
    pub addresses: usize,
    pub last_update: String,
    /// Seconds since the directory asserted this snapshot, when known
    pub age_secs: Option<i64>,
}

/// Address-to-device resolver
///
/// Lookups read the current snapshot without touching the network. A miss
/// triggers one full directory refresh; requests that miss while it runs wait
/// for that same refresh instead of starting their own.
#[derive(Clone)]
pub struct ResolutionCache {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<dyn DirectoryClient>,
    store: Option<SnapshotStore>,
    mode: LookupMode,
    /// Guards only the pointer; never held across I/O
    snapshot: RwLock<Arc<DirectorySnapshot>>,
    inflight: Mutex<Option<RefreshFuture>>,
    pending_write: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ResolutionCache {
    /// Create an empty cache
    pub fn new(
        client: Arc<dyn DirectoryClient>,
        store: Option<SnapshotStore>,
        mode: LookupMode,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                store,
                mode,
                snapshot: RwLock::new(Arc::new(DirectorySnapshot::empty())),
                inflight: Mutex::new(None),
                pending_write: Mutex::new(None),
            }),
        }
    }

    /// Create a cache backed by the Tailscale API and the configured cache file
    pub fn from_config(config: &TailnetConfig) -> TailnetResult<Self> {
        let client = TailscaleClient::new(&config.directory)?;
        let store = match config.directory.mode {
            LookupMode::Cached => Some(SnapshotStore::new(&config.directory.cache_file)),
            LookupMode::Direct => None,
        };

        Ok(Self::new(Arc::new(client), store, config.directory.mode))
    }

    pub fn mode(&self) -> LookupMode {
        self.inner.mode
    }

    /// Load the persisted snapshot, if any
    ///
    /// A missing file starts empty silently; an unreadable one is logged and
    /// also starts empty.
    pub async fn warm_start(&self) {
        if self.inner.mode == LookupMode::Direct {
            return;
        }
        let Some(store) = &self.inner.store else {
            return;
        };

        match store.load().await {
            Ok(snapshot) => {
                info!(
                    device_count = snapshot.device_count(),
                    last_update = %snapshot.last_update(),
                    "loaded device cache"
                );
                self.inner.swap(Arc::new(snapshot));
            }
            Err(e) => {
                warn!(error = %e, "failed to load device cache, starting with empty cache");
            }
        }
    }

    /// Resolve an address to its device
    ///
    /// `Ok(None)` means the directory does not know the address, even after a
    /// refresh. An error means the directory could not be reached or decoded.
    ///
    /// In direct mode the snapshot stays empty, so every lookup is a miss and
    /// the miss is answered by a whois query instead of a full refresh.
    pub async fn resolve(&self, addr: &str) -> TailnetResult<Option<Arc<Device>>> {
        let observed = self.inner.current();
        if let Some(device) = observed.get(addr) {
            return Ok(Some(Arc::clone(device)));
        }

        match self.inner.mode {
            LookupMode::Direct => {
                let device = self.inner.client.fetch_by_address(addr).await?;
                Ok(device.map(Arc::new))
            }
            LookupMode::Cached => {
                info!(client_ip = %addr, "unknown device IP, refreshing cache");

                let snapshot = self.refresh(&observed).await?;
                Ok(snapshot.get(addr).cloned())
            }
        }
    }

    /// Join the running refresh or start one
    ///
    /// If the snapshot changed since `observed` was read, that newer snapshot
    /// is returned without fetching again.
    async fn refresh(
        &self,
        observed: &Arc<DirectorySnapshot>,
    ) -> TailnetResult<Arc<DirectorySnapshot>> {
        let refresh = {
            let mut slot = lock(&self.inner.inflight);

            let current = self.inner.current();
            if !Arc::ptr_eq(&current, observed) {
                return Ok(current);
            }

            // A settled future left in the slot is never joined again
            match slot.as_ref().filter(|running| running.peek().is_none()) {
                Some(running) => running.clone(),
                None => {
                    let inner = Arc::clone(&self.inner);
                    // Spawned so the refresh finishes even if every waiter goes away
                    let task = tokio::spawn(async move {
                        // A panicking client must still reach `install`, which frees the slot
                        let result = AssertUnwindSafe(inner.client.fetch_directory())
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|_| {
                                Err(TailnetError::Fetch("directory client panicked".to_string()))
                            });
                        inner.install(result)
                    });
                    let refresh: RefreshFuture = async move {
                        match task.await {
                            Ok(result) => result,
                            Err(e) => Err(format!("refresh task failed: {}", e)),
                        }
                    }
                    .boxed()
                    .shared();

                    *slot = Some(refresh.clone());
                    refresh
                }
            }
        };

        refresh.await.map_err(TailnetError::Fetch)
    }

    /// Counts and freshness of the snapshot being served
    pub fn snapshot_stats(&self) -> SnapshotStats {
        let snapshot = self.inner.current();
        SnapshotStats {
            devices: snapshot.device_count(),
            addresses: snapshot.len(),
            last_update: snapshot.last_update().to_string(),
            age_secs: snapshot
                .last_update_time()
                .map(|at| (Utc::now() - at).num_seconds()),
        }
    }

    /// Wait for the most recent background snapshot write to finish
    pub async fn persist_pending(&self) {
        let pending = lock(&self.inner.pending_write).take();
        if let Some(handle) = pending {
            if let Err(e) = handle.await {
                error!(error = %e, "device cache write task failed");
            }
        }
    }
}

impl Inner {
    fn current(&self) -> Arc<DirectorySnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn swap(&self, snapshot: Arc<DirectorySnapshot>) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Publish the outcome of a refresh and clear the in-flight slot
    ///
    /// The swap and the slot reset happen under the slot lock so a late misser
    /// either joins this refresh or sees the new snapshot.
    fn install(
        self: &Arc<Self>,
        result: TailnetResult<DirectorySnapshot>,
    ) -> Result<Arc<DirectorySnapshot>, String> {
        let mut slot = lock(&self.inflight);

        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.swap(Arc::clone(&snapshot));
                *slot = None;
                drop(slot);

                info!(
                    device_count = snapshot.device_count(),
                    ip_mappings = snapshot.len(),
                    "refreshed device cache"
                );

                self.persist(Arc::clone(&snapshot));
                Ok(snapshot)
            }
            Err(e) => {
                *slot = None;
                drop(slot);

                error!(error = %e, "failed to refresh device cache");
                Err(match e {
                    TailnetError::Fetch(message) => message,
                    other => other.to_string(),
                })
            }
        }
    }

    /// Write the snapshot in the background, after any earlier write
    fn persist(self: &Arc<Self>, snapshot: Arc<DirectorySnapshot>) {
        let Some(store) = self.store.clone() else {
            return;
        };

        let mut pending = lock(&self.pending_write);
        let previous = pending.take();

        *pending = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    error!(error = %e, "device cache write task failed");
                }
            }
            if let Err(e) = store.save(&snapshot).await {
                error!(error = %e, path = %store.path().display(), "failed to save device cache");
            }
        }));
    }
}
