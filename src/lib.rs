//! # History Store
//!
//! File-backed store for timestamped JSON reports, grouped by subject, with
//! incrementally maintained trend caches.
//!
//! ## Features
//!
//! - **One file per report**: chronologically named JSON files, no database
//! - **Lazy catalog**: directory listing rebuilt only after a change
//! - **Cross-instance sync**: a filesystem watch keeps every open instance of
//!   a subject consistent, including writes from other processes
//! - **Trend caches**: derived series recomputed from the first changed
//!   report only, optionally persisted next to the reports
//!
//! ## Modules
//!
//! - [`storage`]: Report files, catalog, streams and stores
//! - [`cache`]: Queries and in-memory / on-disk trend caches
//! - [`sync`]: Filesystem watch pools for open stores
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use history_store::cache::Timeserie;
//! use history_store::storage::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let history = HistoryStore::new(StoreConfig::new("./data"))?;
//!
//!     // Synchronized store for one subject
//!     let store = history.open("MyServer")?;
//!     store
//!         .put(Report::new().field("date", "1995-12-17T03:24:00Z").field("sessionCount", 100))
//!         .await?;
//!
//!     // Persisted trend cache over one field
//!     let mut cache = store.fs_cache(Arc::new(Timeserie::new("sessionCount")?))?;
//!     let update = cache.compute_trends().await?;
//!     println!("{} points", update.trends.len());
//!
//!     history.close(&store)?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod storage;
pub mod sync;

// Re-export top-level types for convenience
pub use storage::{
    Catalog, CatalogEntry, CatalogView, DateAccessor, HistoryStore, PartialHistory, Report,
    ReportStore, ReportStream, RunMode, StoreConfig, StoreError, StoreResult,
};

pub use cache::{
    FsTrendCache, MemoryTrendCache, Query, Rate, Timeserie, TrendCache, TrendPoint, TrendUpdate,
};

pub use sync::Syncer;

pub use config::{Config, ConfigError, LoggingConfig, StoreConfig as ConfigStoreConfig};
