//! Report stores
//!
//! `HistoryStore` owns a storage root; `ReportStore` addresses one subject
//! directory below it:
//!
//! ```text
//! <root>/<subject>/<epochMillis>-<suffix>.json   raw reports
//! <root>/<subject>/trends/<queryId>.json         persisted trend caches
//! ```
//!
//! Write path: put → normalize date → file write → catalog marked dirty.
//! Read path: catalog (rebuilt if dirty) → stream files from start index.

use crate::cache::fs::FsTrendCache;
use crate::cache::memory::MemoryTrendCache;
use crate::cache::query::Query;
use crate::cache::TrendPoint;
use crate::storage::catalog::{CatalogState, CatalogView};
use crate::storage::codec::{write_report, ReportFileName};
use crate::storage::error::{PartialHistory, StoreError, StoreResult};
use crate::storage::stream::ReportStream;
use crate::storage::types::{DateAccessor, Report};
use crate::sync::Syncer;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Name of the per-subject directory holding trend caches
pub const TRENDS_DIR: &str = "trends";

/// Process mode; the root path is only announced outside development
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Development,
    Production,
    Test,
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(RunMode::Development),
            "production" | "prod" => Ok(RunMode::Production),
            "test" => Ok(RunMode::Test),
            other => Err(format!("unknown run mode {:?}", other)),
        }
    }
}

/// Configuration for a history store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory for all subjects
    pub root: PathBuf,
    /// Process mode
    pub mode: RunMode,
    /// Date accessor for stores opened without an explicit one
    pub date_accessor: DateAccessor,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("history-store-data"),
            mode: RunMode::default(),
            date_accessor: DateAccessor::default(),
        }
    }
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Builder: set the run mode
    pub fn mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builder: set the default date accessor
    pub fn date_accessor(mut self, accessor: DateAccessor) -> Self {
        self.date_accessor = accessor;
        self
    }
}

/// Storage root shared by all subjects, plus the instance synchronizer
pub struct HistoryStore {
    root: PathBuf,
    date_accessor: DateAccessor,
    syncer: Arc<Syncer>,
}

impl HistoryStore {
    /// Create the storage root; failure is fatal
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let root = absolute(&config.root)?;
        std::fs::create_dir_all(&root).map_err(|source| StoreError::RootCreation {
            path: root.clone(),
            source,
        })?;

        if config.mode != RunMode::Development {
            tracing::info!(root = %root.display(), "History storage root");
        }

        Ok(Self {
            root,
            date_accessor: config.date_accessor,
            syncer: Arc::new(Syncer::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Unsynchronized store for a subject, using the default date accessor
    pub fn report(&self, id: &str) -> StoreResult<ReportStore> {
        self.report_with(id, self.date_accessor.clone())
    }

    /// Unsynchronized store for a subject with a custom date accessor
    pub fn report_with(&self, id: &str, accessor: DateAccessor) -> StoreResult<ReportStore> {
        ReportStore::open(&self.root, id, accessor)
    }

    /// Synchronized store: external changes to the subject directory mark
    /// every open instance dirty
    ///
    /// The instance leaves its pool on `close` or when the last handle drops.
    pub fn open(&self, id: &str) -> StoreResult<Arc<ReportStore>> {
        self.open_with(id, self.date_accessor.clone())
    }

    pub fn open_with(&self, id: &str, accessor: DateAccessor) -> StoreResult<Arc<ReportStore>> {
        let mut store = ReportStore::open(&self.root, id, accessor)?;
        self.syncer.register(&store)?;
        store.syncer = Some(Arc::downgrade(&self.syncer));
        Ok(Arc::new(store))
    }

    /// Unregister a synchronized store; unknown instances are ignored
    pub fn close(&self, store: &ReportStore) -> StoreResult<()> {
        self.syncer.unregister(store).map(|_| ())
    }

    /// Number of open synchronized instances for a subject
    pub fn pool_size(&self, id: &str) -> usize {
        self.syncer.pool_size(id)
    }
}

fn absolute(path: &Path) -> StoreResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|source| StoreError::RootCreation {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(cwd.join(path))
}

fn validate_subject(id: &str) -> StoreResult<()> {
    let invalid = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(|c: char| c == '/' || c == '\\' || c == '\0');
    if invalid {
        return Err(StoreError::InvalidSubject(id.to_string()));
    }
    Ok(())
}

/// Reports of one subject
///
/// Every instance is distinct, even for the same subject: equality is by
/// instance id.
#[derive(Debug)]
pub struct ReportStore {
    instance: Uuid,
    id: String,
    dir: PathBuf,
    accessor: DateAccessor,
    catalog: Arc<CatalogState>,
    /// Set for synchronized instances
    syncer: Option<Weak<Syncer>>,
}

impl Drop for ReportStore {
    fn drop(&mut self) {
        let Some(syncer) = self.syncer.take().and_then(|s| s.upgrade()) else {
            return;
        };
        if let Err(e) = syncer.unregister(self) {
            tracing::warn!(subject = %self.id, "Failed to leave sync pool: {}", e);
        }
    }
}

impl PartialEq for ReportStore {
    fn eq(&self, other: &Self) -> bool {
        self.instance == other.instance
    }
}

impl Eq for ReportStore {}

impl ReportStore {
    /// Open the subject directory below `root`, creating it if needed
    pub fn open(root: &Path, id: &str, accessor: DateAccessor) -> StoreResult<Self> {
        validate_subject(id)?;

        let dir = root.join(id);
        match std::fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                tracing::error!(dir = %dir.display(), "Failed to create report directory: {}", e);
                return Err(e.into());
            }
        }

        Ok(Self {
            instance: Uuid::new_v4(),
            id: id.to_string(),
            dir,
            accessor,
            catalog: Arc::new(CatalogState::new()),
            syncer: None,
        })
    }

    /// Subject id
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance
    }

    /// Subject directory
    pub fn folder(&self) -> &Path {
        &self.dir
    }

    pub fn trends_dir(&self) -> PathBuf {
        self.dir.join(TRENDS_DIR)
    }

    pub fn date_accessor(&self) -> &DateAccessor {
        &self.accessor
    }

    /// Timestamp of a report, per this store's accessor
    pub fn date_of(&self, report: &Report) -> StoreResult<DateTime<Utc>> {
        self.accessor.date(report)
    }

    /// Force a catalog rebuild on next access
    pub fn mark_dirty(&self) {
        self.catalog.mark_dirty();
    }

    pub(crate) fn catalog_state(&self) -> Arc<CatalogState> {
        Arc::clone(&self.catalog)
    }

    /// Persist a report; string dates are normalized before writing
    pub async fn put(&self, mut report: Report) -> StoreResult<PathBuf> {
        let date = self.accessor.normalize(&mut report)?;
        let name = ReportFileName::for_date(&date);
        let path = write_report(&self.dir, &name, &report).await?;
        self.catalog.mark_dirty();

        tracing::debug!(subject = %self.id, path = %path.display(), "Stored report");
        Ok(path)
    }

    /// Read the full history in chronological order
    ///
    /// On a decode failure the error carries every report read before the
    /// failing file.
    pub async fn get(&self) -> Result<Vec<Report>, PartialHistory> {
        let mut reports = Vec::new();
        let mut stream = self.stream(None);

        while let Some(item) = stream.next().await {
            match item {
                Ok(report) => reports.push(report),
                Err(e) => return Err(PartialHistory::new(reports, e)),
            }
        }

        Ok(reports)
    }

    /// Lazy reader positioned at the first report with `date >= since`
    pub fn stream(&self, since: Option<DateTime<Utc>>) -> ReportStream<'_> {
        ReportStream::new(self, since)
    }

    /// Current catalog, rebuilt if dirty, with the start index for `since`
    pub async fn catalog(&self, since: Option<&DateTime<Utc>>) -> StoreResult<CatalogView> {
        let catalog = self.catalog.current(&self.dir).await?;
        let start_index = catalog.start_index(since);
        Ok(CatalogView {
            catalog,
            start_index,
        })
    }

    /// In-memory trend cache for a query over this store
    pub fn cache(self: &Arc<Self>, query: Arc<dyn Query>, init: Option<Vec<TrendPoint>>) -> MemoryTrendCache {
        MemoryTrendCache::new(query, Arc::clone(self), init)
    }

    /// Filesystem-persisted trend cache for a query over this store
    pub fn fs_cache(self: &Arc<Self>, query: Arc<dyn Query>) -> StoreResult<FsTrendCache> {
        FsTrendCache::new(query, Arc::clone(self))
    }
}
