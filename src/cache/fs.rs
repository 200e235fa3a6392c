//! Filesystem-persisted trend cache
//!
//! Wraps a [`MemoryTrendCache`] and mirrors its series to
//! `<subject>/trends/<queryId>.json`. The file is only rewritten when the
//! in-memory recompute reports a change. Persistence is best-effort: read
//! and write failures are logged, never returned.

use crate::cache::memory::MemoryTrendCache;
use crate::cache::query::Query;
use crate::cache::{TrendCache, TrendPoint, TrendUpdate};
use crate::storage::codec::write_atomic;
use crate::storage::{ReportStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Cache file stem for queries without an id
pub const ANONYMOUS_QUERY: &str = "anonymous";

pub struct FsTrendCache {
    query: Arc<dyn Query>,
    store: Arc<ReportStore>,
    cache_file: PathBuf,
    memory: Option<MemoryTrendCache>,
}

impl FsTrendCache {
    pub fn new(query: Arc<dyn Query>, store: Arc<ReportStore>) -> StoreResult<Self> {
        let name = query.id().unwrap_or(ANONYMOUS_QUERY);
        validate_query_id(name)?;
        let cache_file = store.trends_dir().join(format!("{}.json", name));

        Ok(Self {
            query,
            store,
            cache_file,
            memory: None,
        })
    }

    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    /// Bring the series up to date, persisting it if it changed
    pub async fn compute_trends(&mut self) -> StoreResult<TrendUpdate> {
        let mut memory = match self.memory.take() {
            Some(memory) => memory,
            None => self.load().await,
        };
        let result = memory.compute_trends().await;
        self.memory = Some(memory);
        let update = result?;

        if update.changed {
            self.persist(&update.trends).await;
        }
        Ok(update)
    }

    /// Lazy init: seed the memory cache from the cache file, if readable
    async fn load(&self) -> MemoryTrendCache {
        let dir = self.store.trends_dir();
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::warn!(dir = %dir.display(), "Failed to create query cache directory: {}", e);
        }

        let seed = read_cache_file(&self.cache_file).await;
        MemoryTrendCache::new(Arc::clone(&self.query), Arc::clone(&self.store), seed)
    }

    async fn persist(&self, trends: &[TrendPoint]) {
        let bytes = match serde_json::to_vec(trends) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %self.cache_file.display(), "Failed to serialize trends: {}", e);
                return;
            }
        };

        match write_atomic(&self.cache_file, &bytes).await {
            Ok(()) => tracing::debug!(path = %self.cache_file.display(), len = trends.len(), "Persisted trends"),
            Err(e) => tracing::warn!(path = %self.cache_file.display(), "Failed to persist trends: {}", e),
        }
    }
}

#[async_trait]
impl TrendCache for FsTrendCache {
    async fn compute_trends(&mut self) -> StoreResult<TrendUpdate> {
        FsTrendCache::compute_trends(self).await
    }
}

fn validate_query_id(id: &str) -> StoreResult<()> {
    let invalid = id.is_empty()
        || id.contains("..")
        || id.contains(|c: char| c == '/' || c == '\\' || c == '\0');
    if invalid {
        return Err(StoreError::InvalidQueryId(id.to_string()));
    }
    Ok(())
}

/// Read a persisted series; any failure means a cold cache
async fn read_cache_file(path: &Path) -> Option<Vec<TrendPoint>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "No trend cache yet, starting cold");
            return None;
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to read trend cache: {}", e);
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(trends) => Some(trends),
        Err(e) => {
            tracing::warn!(path = %path.display(), "Ignoring undecodable trend cache: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Timeserie;
    use crate::storage::{DateAccessor, Report};
    use serde_json::json;
    use tempfile::tempdir;

    fn store(root: &Path) -> Arc<ReportStore> {
        Arc::new(ReportStore::open(root, "MyServer", DateAccessor::default()).unwrap())
    }

    #[test]
    fn test_query_id_validation() {
        assert!(validate_query_id("sessions").is_ok());
        for bad in ["", "../x", "a/b", "a\\b"] {
            assert!(validate_query_id(bad).is_err());
        }
    }

    #[test]
    fn test_cache_file_naming() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let anonymous = Arc::new(Timeserie::new("status.sessionCount").unwrap());
        let cache = FsTrendCache::new(anonymous, Arc::clone(&store)).unwrap();
        assert_eq!(cache.cache_file(), store.trends_dir().join("anonymous.json"));

        let named = Arc::new(Timeserie::new("status.sessionCount").unwrap().with_id("sessions"));
        let cache = FsTrendCache::new(named, Arc::clone(&store)).unwrap();
        assert_eq!(cache.cache_file(), store.trends_dir().join("sessions.json"));

        let bad = Arc::new(Timeserie::new("status.sessionCount").unwrap().with_id("../escape"));
        assert!(matches!(
            FsTrendCache::new(bad, store),
            Err(StoreError::InvalidQueryId(_))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_cache_file_is_cold_start() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store
            .put(Report::new().field("date", "1995-12-17T03:24:00Z").field("status", json!({"sessionCount": 100})))
            .await
            .unwrap();

        std::fs::create_dir_all(store.trends_dir()).unwrap();
        std::fs::write(store.trends_dir().join("anonymous.json"), "[{\"date\":").unwrap();

        let query = Arc::new(Timeserie::new("status.sessionCount").unwrap());
        let mut cache = FsTrendCache::new(query, Arc::clone(&store)).unwrap();
        let update = cache.compute_trends().await.unwrap();

        assert!(update.changed);
        assert_eq!(update.trends.len(), 1);
        let persisted: Vec<TrendPoint> =
            serde_json::from_slice(&std::fs::read(cache.cache_file()).unwrap()).unwrap();
        assert_eq!(persisted, *update.trends);
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store
            .put(Report::new().field("date", "1995-12-17T03:24:00Z").field("status", json!({"sessionCount": 100})))
            .await
            .unwrap();

        // A plain file where the trends directory should be makes every write fail
        std::fs::write(store.trends_dir(), "").unwrap();

        let query = Arc::new(Timeserie::new("status.sessionCount").unwrap());
        let mut cache = FsTrendCache::new(query, store).unwrap();
        let update = cache.compute_trends().await.unwrap();
        assert_eq!(update.trends.len(), 1);
    }
}
