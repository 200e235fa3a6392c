//! History Store Storage Layer
//!
//! This module provides the raw report history:
//!
//! - **types**: Report values, date accessors, date normalization
//! - **codec**: Report file naming and JSON bodies
//! - **catalog**: Sorted `{date, location}` index, rebuilt lazily when dirty
//! - **stream**: Lazy pull-based report reader
//! - **store**: `HistoryStore` root and per-subject `ReportStore`
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   Report → normalize date → <millis>-<suffix>.json → catalog dirty
//!
//! Read Path:
//!   Catalog (rebuild if dirty) → binary search start → read file by file
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use history_store::storage::{HistoryStore, Report, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let history = HistoryStore::new(StoreConfig::new("./data"))?;
//!     let store = history.report("MyServer")?;
//!
//!     store
//!         .put(Report::new().field("date", "1995-12-17T03:24:00").field("sessions", 100))
//!         .await?;
//!
//!     let reports = store.get().await?;
//!     println!("{} reports", reports.len());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod codec;
pub mod error;
pub mod store;
pub mod stream;
pub mod types;

// Re-export commonly used types
pub use catalog::{Catalog, CatalogEntry, CatalogState, CatalogView};
pub use codec::{ReportFileName, REPORT_EXTENSION};
pub use error::{PartialHistory, StoreError, StoreResult};
pub use store::{HistoryStore, ReportStore, RunMode, StoreConfig, TRENDS_DIR};
pub use stream::ReportStream;
pub use types::{format_date, parse_date, parse_path, DateAccessor, DateExtractor, Report};
