//! Report file codec
//!
//! One report per file, named `<epochMillis>-<suffix>.json`:
//! - `epochMillis`: the report timestamp, zero padded to 13 digits
//! - `suffix`: nanoseconds of a process-monotonic clock, zero padded to 9 digits
//!
//! Padding keeps lexicographic file name order equal to chronological order.
//! Bodies are UTF-8 JSON objects. Writes land in a `.tmp` sibling first and
//! are renamed into place, so readers never observe partial files.

use crate::storage::error::{StoreError, StoreResult};
use crate::storage::types::Report;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Instant;

/// Extension of files taking part in catalog building
pub const REPORT_EXTENSION: &str = "json";

/// Parsed report file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReportFileName {
    /// Report timestamp in milliseconds
    pub millis: i64,
    /// Disambiguator for reports sharing a millisecond
    pub suffix: u32,
}

impl ReportFileName {
    /// Name a new report file for the given date
    pub fn for_date(date: &DateTime<Utc>) -> Self {
        Self {
            millis: date.timestamp_millis(),
            suffix: monotonic_suffix(),
        }
    }

    /// Parse `<millis>-<suffix>.json`; unpadded names are accepted
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".json")?;
        let (millis, suffix) = stem.rsplit_once('-')?;
        Some(Self {
            millis: millis.parse().ok()?,
            suffix: suffix.parse().ok()?,
        })
    }

    pub fn file_name(&self) -> String {
        format!("{:013}-{:09}.{}", self.millis, self.suffix, REPORT_EXTENSION)
    }
}

fn monotonic_suffix() -> u32 {
    static START: OnceLock<Instant> = OnceLock::new();
    let elapsed = START.get_or_init(Instant::now).elapsed();
    (elapsed.as_nanos() % 1_000_000_000) as u32
}

/// Whether a path takes part in catalog building
pub fn is_report_file(path: &Path) -> bool {
    path.extension().map(|e| e == REPORT_EXTENSION).unwrap_or(false)
}

/// Serialize a report body
pub fn encode(report: &Report) -> StoreResult<Vec<u8>> {
    Ok(serde_json::to_vec(report)?)
}

/// Decode a report body read from `path`
pub fn decode(path: &Path, bytes: &[u8]) -> StoreResult<Report> {
    let value: serde_json::Value = serde_json::from_slice(bytes).map_err(|e| decode_error(path, e))?;
    Report::from_value(value).map_err(|e| decode_error(path, e))
}

fn decode_error(path: &Path, reason: impl ToString) -> StoreError {
    StoreError::Decode {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Read and decode one report file
pub async fn read_report(path: &Path) -> StoreResult<Report> {
    let bytes = tokio::fs::read(path).await?;
    decode(path, &bytes)
}

/// Write a new report file under `dir`, returning its path
pub async fn write_report(dir: &Path, name: &ReportFileName, report: &Report) -> StoreResult<PathBuf> {
    let path = dir.join(name.file_name());
    write_atomic(&path, &encode(report)?).await?;
    Ok(path)
}

/// Write `bytes` to `path` through a temporary sibling and a rename
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
