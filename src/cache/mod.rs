//! Trend caches
//!
//! Derived series ("trends") computed from a store by a [`Query`], reused
//! across calls:
//!
//! - **query**: the `Query` capability and the built-in field queries
//! - **memory**: incremental in-memory cache, recomputing only the suffix
//!   affected by new or changed reports
//! - **fs**: wraps the memory cache and persists it under `<subject>/trends/`
//!
//! # Recompute
//!
//! ```text
//! catalog dates:  t1 t2 t3 t4 t5
//! cached trends:  t1 t2 t3            → diverge at 3, recompute from t3
//! delta:                t3 t4 t5      → drop boundary t3, append t4 t5
//! ```

pub mod fs;
pub mod memory;
pub mod query;

pub use fs::{FsTrendCache, ANONYMOUS_QUERY};
pub use memory::MemoryTrendCache;
pub use query::{Query, Rate, Timeserie};

use crate::storage::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// One element of a trend series, tagged with its source report date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: DateTime<Utc>,
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

impl TrendPoint {
    pub fn new(date: DateTime<Utc>) -> Self {
        Self {
            date,
            values: Map::new(),
        }
    }

    /// Builder method: set a value
    pub fn value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

/// Result of a trend computation
#[derive(Debug, Clone)]
pub struct TrendUpdate {
    /// Current series; the same `Arc` is returned while nothing changes
    pub trends: Arc<Vec<TrendPoint>>,
    /// Whether the series differs from the previous computation
    pub changed: bool,
}

/// A cache able to bring a trend series up to date
#[async_trait]
pub trait TrendCache: Send {
    async fn compute_trends(&mut self) -> StoreResult<TrendUpdate>;
}
