//! Core data types for the history store
//!
//! This module defines the fundamental types used throughout the storage layer:
//! - `Report`: one timestamped JSON object
//! - `DateAccessor`: how the timestamp is located inside a report
//! - date parsing and canonical formatting helpers

use crate::storage::error::{StoreError, StoreResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Default report field holding the timestamp
pub const DEFAULT_DATE_FIELD: &str = "date";

/// A single persisted report
///
/// Reports are opaque JSON objects. One field (located through a
/// [`DateAccessor`]) carries the report timestamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Report(Map<String, Value>);

impl Report {
    /// Create an empty report
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder method: set a top-level field
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Convert a JSON value into a report, rejecting non-objects
    pub fn from_value(value: Value) -> StoreResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StoreError::Serialization(format!(
                "report must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Look up a nested value by path segments
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.0.get(first.as_ref())?;
        for segment in rest {
            current = current.as_object()?.get(segment.as_ref())?;
        }
        Some(current)
    }

    fn get_path_mut<S: AsRef<str>>(&mut self, path: &[S]) -> Option<&mut Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.0.get_mut(first.as_ref())?;
        for segment in rest {
            current = current.as_object_mut()?.get_mut(segment.as_ref())?;
        }
        Some(current)
    }

    /// Get a top-level field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Report {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Report {
    type Error = StoreError;

    fn try_from(value: Value) -> StoreResult<Self> {
        Self::from_value(value)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Custom date extraction function
pub type DateExtractor = Arc<dyn Fn(&Report) -> Option<DateTime<Utc>> + Send + Sync>;

/// How to find the timestamp of a report
#[derive(Clone)]
pub enum DateAccessor {
    /// Top-level field name
    Field(String),
    /// Nested field, e.g. `"meta.created.at"`
    Path(Vec<String>),
    /// Arbitrary extraction function (read-only: never rewritten on put)
    Custom(DateExtractor),
}

impl Default for DateAccessor {
    fn default() -> Self {
        DateAccessor::Field(DEFAULT_DATE_FIELD.to_string())
    }
}

impl fmt::Debug for DateAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateAccessor::Field(name) => f.debug_tuple("Field").field(name).finish(),
            DateAccessor::Path(path) => f.debug_tuple("Path").field(path).finish(),
            DateAccessor::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl DateAccessor {
    /// Build an accessor from a field name or dotted path
    ///
    /// Fails on empty specs and empty segments (`"a..b"`, `".a"`, `"a."`).
    pub fn parse(path: &str) -> StoreResult<Self> {
        let segments = parse_path(path)?;
        Ok(match segments.len() {
            1 => DateAccessor::Field(path.to_string()),
            _ => DateAccessor::Path(segments),
        })
    }

    /// Build an accessor from a custom extraction function
    pub fn custom<F>(extract: F) -> Self
    where
        F: Fn(&Report) -> Option<DateTime<Utc>> + Send + Sync + 'static,
    {
        DateAccessor::Custom(Arc::new(extract))
    }

    /// Resolve the timestamp of a report
    pub fn date(&self, report: &Report) -> StoreResult<DateTime<Utc>> {
        match self {
            DateAccessor::Field(name) => date_of(report.get(name)),
            DateAccessor::Path(path) => date_of(report.get_path(path)),
            DateAccessor::Custom(extract) => extract(report).ok_or(StoreError::MissingDate),
        }
    }

    /// Resolve the timestamp and rewrite the date value in canonical form
    pub fn normalize(&self, report: &mut Report) -> StoreResult<DateTime<Utc>> {
        let slot = match self {
            DateAccessor::Field(name) => report.0.get_mut(name.as_str()),
            DateAccessor::Path(path) => report.get_path_mut(path),
            DateAccessor::Custom(_) => return self.date(report),
        };

        let slot = slot.ok_or(StoreError::MissingDate)?;
        let date = parse_date(slot).ok_or_else(|| StoreError::InvalidDate(slot.to_string()))?;
        *slot = Value::String(format_date(&date));
        Ok(date)
    }
}

/// Split a dotted field path, rejecting empty segments
pub fn parse_path(path: &str) -> StoreResult<Vec<String>> {
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

fn date_of(value: Option<&Value>) -> StoreResult<DateTime<Utc>> {
    let value = value.ok_or(StoreError::MissingDate)?;
    parse_date(value).ok_or_else(|| StoreError::InvalidDate(value.to_string()))
}

/// Interpret a JSON value as a timestamp
///
/// Accepts RFC 3339 strings, naive ISO date-times (taken as UTC),
/// `YYYY-MM-DD` dates and integer epoch milliseconds.
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date_str(s),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Parse a serialized date string
pub fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Canonical persisted form: `YYYY-MM-DDTHH:MM:SS.mmmZ`
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}
