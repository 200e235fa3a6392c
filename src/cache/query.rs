//! Query capability
//!
//! A query derives a trend series from a store. Caches call it with the
//! date of the last still-valid trend point; the query must return the
//! series starting *at* that date (inclusive) so stateful derivations can
//! seed themselves from the boundary report.

use crate::cache::TrendPoint;
use crate::storage::{parse_path, Catalog, Report, ReportStore, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

#[async_trait]
pub trait Query: Send + Sync {
    /// Cache file name; anonymous queries share one bucket
    fn id(&self) -> Option<&str> {
        None
    }

    /// Trend series from the first report with `date >= since`
    async fn from_store(
        &self,
        store: &ReportStore,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<TrendPoint>>;

    /// Catalog the cache diffs against
    async fn catalog(&self, store: &ReportStore) -> StoreResult<Arc<Catalog>> {
        Ok(store.catalog(None).await?.catalog)
    }
}

/// Dotted field path plus the name its values are published under
#[derive(Debug, Clone)]
struct FieldPath {
    segments: Vec<String>,
    name: String,
}

impl FieldPath {
    fn parse(path: &str) -> StoreResult<Self> {
        let segments = parse_path(path)?;
        let name = segments.last().cloned().unwrap_or_default();
        Ok(Self { segments, name })
    }

    fn extract(&self, report: &Report) -> Value {
        report.get_path(&self.segments).cloned().unwrap_or(Value::Null)
    }
}

/// Extracts one field per report: `{date, <field>: value}`
#[derive(Debug, Clone)]
pub struct Timeserie {
    field: FieldPath,
    id: Option<String>,
}

impl Timeserie {
    pub fn new(path: &str) -> StoreResult<Self> {
        Ok(Self {
            field: FieldPath::parse(path)?,
            id: None,
        })
    }

    /// Builder: name the cache file
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[async_trait]
impl Query for Timeserie {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    async fn from_store(
        &self,
        store: &ReportStore,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<TrendPoint>> {
        let mut points = Vec::new();
        let mut reports = store.stream(since);

        while let Some(report) = reports.next().await {
            let report = report?;
            let date = store.date_of(&report)?;
            points.push(TrendPoint::new(date).value(self.field.name.clone(), self.field.extract(&report)));
        }

        Ok(points)
    }
}

/// Per-second rate of change of one numeric field
///
/// The first point of a series carries `null`: it has no predecessor.
#[derive(Debug, Clone)]
pub struct Rate {
    field: FieldPath,
    id: Option<String>,
}

impl Rate {
    pub fn new(path: &str) -> StoreResult<Self> {
        Ok(Self {
            field: FieldPath::parse(path)?,
            id: None,
        })
    }

    /// Builder: name the cache file
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[async_trait]
impl Query for Rate {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    async fn from_store(
        &self,
        store: &ReportStore,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<TrendPoint>> {
        let mut points = Vec::new();
        let mut previous: Option<(DateTime<Utc>, f64)> = None;
        let mut reports = store.stream(since);

        while let Some(report) = reports.next().await {
            let report = report?;
            let date = store.date_of(&report)?;
            let value = self.field.extract(&report).as_f64();

            let rate = match (previous, value) {
                (Some((prev_date, prev_value)), Some(value)) => {
                    let secs = (date - prev_date).num_milliseconds() as f64 / 1000.0;
                    if secs > 0.0 {
                        Value::from((value - prev_value) / secs)
                    } else {
                        Value::Null
                    }
                }
                _ => Value::Null,
            };

            if let Some(value) = value {
                previous = Some((date, value));
            }
            points.push(TrendPoint::new(date).value(self.field.name.clone(), rate));
        }

        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DateAccessor;
    use serde_json::json;
    use tempfile::tempdir;

    async fn populated() -> (ReportStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = ReportStore::open(dir.path(), "MyServer", DateAccessor::default()).unwrap();
        for (date, count) in [
            ("1995-12-17T03:24:00Z", 100),
            ("1995-12-17T03:24:10Z", 150),
            ("1995-12-17T03:24:30Z", 130),
        ] {
            store
                .put(Report::new().field("date", date).field("status", json!({"sessionCount": count})))
                .await
                .unwrap();
        }
        (store, dir)
    }

    #[test]
    fn test_invalid_paths_fail_fast() {
        assert!(Timeserie::new("status..sessionCount").is_err());
        assert!(Rate::new("").is_err());
    }

    #[tokio::test]
    async fn test_timeserie_extracts_field() {
        let (store, _dir) = populated().await;
        let query = Timeserie::new("status.sessionCount").unwrap();

        let points = query.from_store(&store, None).await.unwrap();
        let values: Vec<&Value> = points.iter().filter_map(|p| p.get("sessionCount")).collect();
        assert_eq!(values, vec![&json!(100), &json!(150), &json!(130)]);
        assert_eq!(query.id(), None);
    }

    #[tokio::test]
    async fn test_timeserie_since_is_inclusive() {
        let (store, _dir) = populated().await;
        let query = Timeserie::new("status.sessionCount").unwrap().with_id("sessions");
        let since = crate::storage::types::parse_date_str("1995-12-17T03:24:10Z");

        let points = query.from_store(&store, since).await.unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].get("sessionCount"), Some(&json!(150)));
        assert_eq!(query.id(), Some("sessions"));
    }

    #[tokio::test]
    async fn test_rate_of_change() {
        let (store, _dir) = populated().await;
        let query = Rate::new("status.sessionCount").unwrap();

        let points = query.from_store(&store, None).await.unwrap();
        let rates: Vec<Value> = points.iter().map(|p| p.get("sessionCount").cloned().unwrap()).collect();
        assert_eq!(rates, vec![Value::Null, json!(5.0), json!(-1.0)]);
    }
}
