//! Extractor: full table pull from a [`DocumentSource`] into a normalized [`Snapshot`].
//!
//! Every extraction is a full read; there is no filtering or delta logic. Column names are
//! normalized (see [`crate::normalize`]) and cell values are passed through as the source
//! returned them, apart from the per-column type inference done by [`Snapshot::from_rows`].
//!
//! A table with zero rows is a successful extraction: callers check [`Snapshot::is_empty`] and
//! skip the sync.

use crate::error::{SyncError, SyncResult};
use crate::normalize::normalize_columns;
use crate::source::{DocumentSource, RawTable};
use crate::types::Snapshot;

/// Reads tables from a source and normalizes them.
#[derive(Debug, Clone)]
pub struct Extractor<S> {
    source: S,
}

impl<S: DocumentSource> Extractor<S> {
    /// Wrap a document source.
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Fetch `table_id` from `document_id` as a normalized snapshot.
    ///
    /// Any source failure (missing credential, transport, not found, malformed response) is
    /// reported as [`SyncError::Extraction`] naming the document and table.
    pub fn extract(&self, document_id: &str, table_id: &str) -> SyncResult<Snapshot> {
        let raw = self
            .source
            .get_table(document_id, table_id)
            .map_err(|source| SyncError::Extraction {
                document_id: document_id.to_string(),
                table_id: table_id.to_string(),
                source,
            })?;

        let snapshot = snapshot_from_raw(raw)?;
        tracing::info!(
            document_id,
            table_id,
            rows = snapshot.row_count(),
            columns = snapshot.schema.len(),
            "extracted table"
        );
        Ok(snapshot)
    }
}

/// Normalize a raw table's column names and build a snapshot from it.
pub fn snapshot_from_raw(raw: RawTable) -> SyncResult<Snapshot> {
    let columns = normalize_columns(raw.columns.as_slice())?;
    Ok(Snapshot::from_rows(columns, raw.rows))
}
