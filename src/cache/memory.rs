//! In-memory trend cache
//!
//! Keeps the last computed series and, on each call, recomputes only from
//! the first point where the store's catalog no longer matches the dates
//! embedded in the cached series.

use crate::cache::query::Query;
use crate::cache::{TrendCache, TrendPoint, TrendUpdate};
use crate::storage::{CatalogEntry, ReportStore, StoreResult};
use async_trait::async_trait;
use std::sync::Arc;

pub struct MemoryTrendCache {
    query: Arc<dyn Query>,
    store: Arc<ReportStore>,
    trends: Option<Arc<Vec<TrendPoint>>>,
}

impl MemoryTrendCache {
    /// Create a cache, optionally seeded with a previously computed series
    pub fn new(query: Arc<dyn Query>, store: Arc<ReportStore>, init: Option<Vec<TrendPoint>>) -> Self {
        Self {
            query,
            store,
            trends: init.map(Arc::new),
        }
    }

    /// Last computed series, if any
    pub fn trends(&self) -> Option<&Arc<Vec<TrendPoint>>> {
        self.trends.as_ref()
    }

    /// Bring the series up to date with the store
    pub async fn compute_trends(&mut self) -> StoreResult<TrendUpdate> {
        let catalog = self.query.catalog(&self.store).await?;

        let Some(previous) = self.trends.clone() else {
            let trends = Arc::new(self.query.from_store(&self.store, None).await?);
            self.trends = Some(Arc::clone(&trends));
            return Ok(TrendUpdate {
                trends,
                changed: true,
            });
        };

        let index = divergence_index(catalog.entries(), &previous);
        let recompute_date = index.checked_sub(1).map(|i| previous[i].date);
        let delta = self.query.from_store(&self.store, recompute_date).await?;

        match splice(&previous, index, delta) {
            Some(next) => {
                tracing::debug!(
                    subject = %self.store.id(),
                    from = index,
                    len = next.len(),
                    "Recomputed trends"
                );
                let trends = Arc::new(next);
                self.trends = Some(Arc::clone(&trends));
                Ok(TrendUpdate {
                    trends,
                    changed: true,
                })
            }
            None => Ok(TrendUpdate {
                trends: previous,
                changed: false,
            }),
        }
    }
}

#[async_trait]
impl TrendCache for MemoryTrendCache {
    async fn compute_trends(&mut self) -> StoreResult<TrendUpdate> {
        MemoryTrendCache::compute_trends(self).await
    }
}

/// First index where the catalog date differs from the cached point date
///
/// Equals `min(trends.len(), catalog.len())` when one is a prefix of the other.
pub(crate) fn divergence_index(catalog: &[CatalogEntry], trends: &[TrendPoint]) -> usize {
    trends
        .iter()
        .zip(catalog)
        .position(|(point, entry)| point.date.timestamp_millis() != entry.date)
        .unwrap_or_else(|| trends.len().min(catalog.len()))
}

/// Merge a boundary-inclusive delta into the cached series
///
/// Returns `None` when the series is unchanged.
pub(crate) fn splice(previous: &[TrendPoint], index: usize, delta: Vec<TrendPoint>) -> Option<Vec<TrendPoint>> {
    if index == 0 {
        // Full rebuild: no boundary point to drop.
        if delta.is_empty() && previous.is_empty() {
            return None;
        }
        return Some(delta);
    }

    // The delta starts at the first report sharing the boundary date; skip
    // every retained point with that date.
    let boundary = previous[index - 1].date;
    let skip = previous[..index]
        .iter()
        .rev()
        .take_while(|p| p.date == boundary)
        .count();
    let tail = delta.into_iter().skip(skip);

    if index == previous.len() {
        let tail: Vec<TrendPoint> = tail.collect();
        if tail.is_empty() {
            return None;
        }
        let mut next = previous.to_vec();
        next.extend(tail);
        return Some(next);
    }

    let mut next = previous[..index].to_vec();
    next.extend(tail);
    Some(next)
}
