//! CSV export of snapshots.
//!
//! One header row of column names followed by the data rows. Nulls are written as empty fields;
//! quoting follows the `csv` crate's defaults.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::SyncResult;
use crate::types::Snapshot;

/// Write `snapshot` as CSV to `writer`.
pub fn write_csv<W: Write>(snapshot: &Snapshot, writer: W) -> SyncResult<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(snapshot.schema.field_names())?;
    for row in &snapshot.rows {
        wtr.write_record(row.iter().map(|v| v.to_string()))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write `snapshot` as CSV to a new file at `path` (truncating an existing file).
pub fn export_csv_to_path(snapshot: &Snapshot, path: impl AsRef<Path>) -> SyncResult<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    write_csv(snapshot, file)?;
    tracing::info!(path = %path.display(), rows = snapshot.row_count(), "exported csv");
    Ok(())
}
