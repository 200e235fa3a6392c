//! Instance synchronizer
//!
//! Pools every open store instance of a subject behind a single filesystem
//! watch on the subject directory. Any change notification marks every
//! pooled catalog dirty, so the next read in any instance (or any process
//! writing to the same directory) sees a fresh listing.
//!
//! # Lifecycle
//!
//! ```text
//! register(first instance of id) → create pool + start watch
//! register(next instance)        → join pool
//! unregister(last instance)      → stop watch + drop pool
//! drop(synchronized instance)     → unregister
//! ```

use crate::storage::{CatalogState, ReportStore, StoreError, StoreResult};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

type Members = Arc<Mutex<HashMap<Uuid, Arc<CatalogState>>>>;

/// Instances of one subject sharing a watch
struct SyncPool {
    members: Members,
    /// Dropping the watcher stops the watch
    _watcher: RecommendedWatcher,
}

impl SyncPool {
    fn watch(id: &str, dir: &Path) -> StoreResult<Self> {
        let members: Members = Arc::new(Mutex::new(HashMap::new()));
        let fanout = Arc::clone(&members);
        let subject = id.to_string();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event.kind.is_access() {
                    return;
                }
                match fanout.lock() {
                    Ok(members) => {
                        tracing::debug!(subject = %subject, instances = members.len(), "Subject directory changed");
                        for state in members.values() {
                            state.mark_dirty();
                        }
                    }
                    Err(e) => tracing::warn!(subject = %subject, "Sync pool lock poisoned: {}", e),
                }
            }
            Err(e) => tracing::warn!(subject = %subject, "Watch error: {}", e),
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        tracing::info!(subject = %id, dir = %dir.display(), "Started subject watch");
        Ok(Self {
            members,
            _watcher: watcher,
        })
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<Uuid, Arc<CatalogState>>>> {
        self.members
            .lock()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire pool lock: {}", e)))
    }
}

/// Registry of sync pools keyed by subject id
#[derive(Default)]
pub struct Syncer {
    pools: Mutex<HashMap<String, SyncPool>>,
}

impl std::fmt::Debug for Syncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Syncer").finish_non_exhaustive()
    }
}

impl Syncer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<String, SyncPool>>> {
        self.pools
            .lock()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire syncer lock: {}", e)))
    }

    /// Add a store to its subject's pool, starting the watch if needed
    pub fn register(&self, store: &ReportStore) -> StoreResult<()> {
        let mut pools = self.lock()?;

        if !pools.contains_key(store.id()) {
            let pool = SyncPool::watch(store.id(), store.folder())?;
            pools.insert(store.id().to_string(), pool);
        }

        if let Some(pool) = pools.get(store.id()) {
            pool.lock()?
                .insert(store.instance_id(), store.catalog_state());
        }
        Ok(())
    }

    /// Remove a store from its pool; the last one out stops the watch
    ///
    /// Returns whether the store was registered.
    pub fn unregister(&self, store: &ReportStore) -> StoreResult<bool> {
        let mut pools = self.lock()?;

        let Some(pool) = pools.get(store.id()) else {
            return Ok(false);
        };

        let (removed, empty) = {
            let mut members = pool.lock()?;
            let removed = members.remove(&store.instance_id()).is_some();
            (removed, members.is_empty())
        };

        if empty {
            pools.remove(store.id());
            tracing::info!(subject = %store.id(), "Stopped subject watch");
        }
        Ok(removed)
    }

    /// Number of registered instances for a subject
    pub fn pool_size(&self, id: &str) -> usize {
        let Ok(pools) = self.lock() else {
            return 0;
        };
        let size = match pools.get(id) {
            Some(pool) => pool.lock().map(|members| members.len()).unwrap_or(0),
            None => 0,
        };
        size
    }
}
