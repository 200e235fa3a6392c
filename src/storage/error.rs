//! History store error types
//!
//! Defines all errors that can occur in the storage and cache layers.

use crate::storage::types::Report;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the history store
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A report or cache file could not be decoded
    #[error("Can't read report {path:?}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// The configured date accessor found nothing in the report
    #[error("Report has no date")]
    MissingDate,

    /// The date value could not be interpreted as a timestamp
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// Dotted field path is malformed
    #[error("Invalid field path: {0:?}")]
    InvalidPath(String),

    /// Query id cannot be used as a cache file name
    #[error("Invalid query id: {0:?}")]
    InvalidQueryId(String),

    /// Subject id cannot be used as a directory name
    #[error("Invalid subject id: {0:?}")]
    InvalidSubject(String),

    /// Storage root could not be created
    #[error("Failed to create history storage root at {path:?}: {source}")]
    RootCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Filesystem watch could not be established
    #[error("Watch error: {0}")]
    Watch(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<notify::Error> for StoreError {
    fn from(err: notify::Error) -> Self {
        StoreError::Watch(err.to_string())
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure of a full history read.
///
/// `reports` holds every report decoded before the failing file, in
/// chronological order.
#[derive(Error, Debug)]
#[error("history read stopped after {} reports: {error}", reports.len())]
pub struct PartialHistory {
    pub reports: Vec<Report>,
    #[source]
    pub error: StoreError,
}

impl PartialHistory {
    pub fn new(reports: Vec<Report>, error: StoreError) -> Self {
        Self { reports, error }
    }
}
