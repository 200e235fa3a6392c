//! Lazy report sequence
//!
//! Single-pass, forward-only reader over one subject's reports. The catalog
//! is fetched on the first pull; each later pull reads and decodes one file.
//! A decode failure is yielded once as `Err` and ends the sequence.

use crate::storage::catalog::CatalogView;
use crate::storage::codec::read_report;
use crate::storage::error::StoreResult;
use crate::storage::store::ReportStore;
use crate::storage::types::Report;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, Stream};

pub struct ReportStream<'a> {
    store: &'a ReportStore,
    since: Option<DateTime<Utc>>,
    view: Option<CatalogView>,
    index: usize,
    done: bool,
}

impl<'a> ReportStream<'a> {
    pub(crate) fn new(store: &'a ReportStore, since: Option<DateTime<Utc>>) -> Self {
        Self {
            store,
            since,
            view: None,
            index: 0,
            done: false,
        }
    }

    /// Pull the next report
    ///
    /// Returns `None` once the catalog end is reached or after an error has
    /// been yielded.
    pub async fn next(&mut self) -> Option<StoreResult<Report>> {
        if self.done {
            return None;
        }

        if self.view.is_none() {
            match self.store.catalog(self.since.as_ref()).await {
                Ok(view) => {
                    self.index = view.start_index;
                    self.view = Some(view);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        let location = match self.view.as_ref().and_then(|v| v.entries().get(self.index)) {
            Some(entry) => entry.location.clone(),
            None => {
                self.done = true;
                return None;
            }
        };

        match read_report(&location).await {
            Ok(report) => {
                self.index += 1;
                Some(Ok(report))
            }
            Err(e) => {
                tracing::warn!(subject = %self.store.id(), path = %location.display(), "Can't read report: {}", e);
                self.done = true;
                Some(Err(e))
            }
        }
    }

    /// Adapt into a `futures` stream
    pub fn into_stream(self) -> impl Stream<Item = StoreResult<Report>> + 'a {
        stream::unfold(self, |mut reports| async move {
            reports.next().await.map(|item| (item, reports))
        })
    }
}
