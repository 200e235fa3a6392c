//! Report catalog
//!
//! Sorted index of `{date, location}` over the report files of one subject
//! directory. A catalog is an immutable snapshot: rebuilds replace it
//! wholesale, readers holding the previous `Arc<Catalog>` keep a consistent
//! view.
//!
//! # Performance
//! - Rebuild: one directory listing, O(n log n) sort
//! - Start lookup: O(log n) binary search

use crate::storage::codec::{is_report_file, ReportFileName};
use crate::storage::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Location of one report on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    /// Report timestamp in milliseconds
    pub date: i64,
    /// Report file path
    pub location: PathBuf,
}

impl CatalogEntry {
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.date)
    }
}

/// Immutable, ascending snapshot of a subject directory
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// List `dir` and index every `<millis>-<suffix>.json` file
    pub async fn scan(dir: &Path) -> StoreResult<Self> {
        let mut named = Vec::new();
        let mut listing = tokio::fs::read_dir(dir).await?;

        while let Some(entry) = listing.next_entry().await? {
            let path = entry.path();
            if !is_report_file(&path) || !entry.file_type().await?.is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy().into_owned();
            match ReportFileName::parse(&file_name) {
                Some(name) => named.push((name, file_name, path)),
                None => tracing::debug!(path = %path.display(), "Skipping unrecognized report file"),
            }
        }

        Ok(Self::from_named(named))
    }

    fn from_named(mut named: Vec<(ReportFileName, String, PathBuf)>) -> Self {
        named.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
        let entries = named
            .into_iter()
            .map(|(name, _, location)| CatalogEntry {
                date: name.millis,
                location,
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the first entry with `date >= since` (0 when `since` is absent)
    pub fn start_index(&self, since: Option<&DateTime<Utc>>) -> usize {
        match since {
            Some(since) => {
                let since = since.timestamp_millis();
                self.entries.partition_point(|e| e.date < since)
            }
            None => 0,
        }
    }
}

/// A catalog snapshot positioned at a start date
#[derive(Debug, Clone)]
pub struct CatalogView {
    pub catalog: Arc<Catalog>,
    pub start_index: usize,
}

impl CatalogView {
    pub fn entries(&self) -> &[CatalogEntry] {
        self.catalog.entries()
    }

    /// Entries from `start_index` to the end
    pub fn remaining(&self) -> &[CatalogEntry] {
        &self.catalog.entries()[self.start_index..]
    }
}

/// Lazily rebuilt catalog, gated by a change generation
///
/// Every change notification bumps the generation. A snapshot is tagged with
/// the generation read before its listing started, and is current only while
/// no change has been recorded since. Overlapping rebuilds never replace a
/// snapshot with one listed earlier.
///
/// Shared between a store instance and the synchronizer pool that fans out
/// external change notifications.
#[derive(Debug, Default)]
pub struct CatalogState {
    snapshot: RwLock<Option<(u64, Arc<Catalog>)>>,
    generation: AtomicU64,
}

impl CatalogState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a rebuild on next access
    pub fn mark_dirty(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Whether the next access rebuilds the catalog
    pub fn is_dirty(&self) -> bool {
        match self.read_snapshot() {
            Ok(Some((tag, _))) => tag != self.generation.load(Ordering::Acquire),
            _ => true,
        }
    }

    /// Current snapshot, rebuilding from `dir` when dirty
    pub async fn current(&self, dir: &Path) -> StoreResult<Arc<Catalog>> {
        let generation = self.generation.load(Ordering::Acquire);
        if let Some((tag, catalog)) = self.read_snapshot()? {
            if tag == generation {
                return Ok(catalog);
            }
        }

        let catalog = Arc::new(Catalog::scan(dir).await?);
        tracing::debug!(dir = %dir.display(), entries = catalog.len(), generation, "Rebuilt catalog");
        self.install(generation, Arc::clone(&catalog))?;
        Ok(catalog)
    }

    /// Keep the snapshot listed at the latest generation
    fn install(&self, generation: u64, catalog: Arc<Catalog>) -> StoreResult<()> {
        let mut snapshot = self
            .snapshot
            .write()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire catalog lock: {}", e)))?;
        let newer_installed = matches!(snapshot.as_ref(), Some((tag, _)) if *tag > generation);
        if !newer_installed {
            *snapshot = Some((generation, catalog));
        }
        Ok(())
    }

    fn read_snapshot(&self) -> StoreResult<Option<(u64, Arc<Catalog>)>> {
        let snapshot = self
            .snapshot
            .read()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire catalog lock: {}", e)))?;
        Ok(snapshot.clone())
    }
}
