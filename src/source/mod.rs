//! Document sources.
//!
//! A [`DocumentSource`] returns the full contents of one table inside one document, exactly as
//! the source reports it: raw column titles plus rows of [`crate::types::Value`]s. Column-name
//! normalization and type inference happen later, in [`crate::extract`].
//!
//! Implementations:
//! - [`coda`]: the Coda REST API (bearer token from `CODA_TOKEN`)
//! - [`file`]: CSV / JSON exports on local disk

pub mod coda;
pub mod file;

use crate::error::SourceResult;
use crate::types::Value;

pub use coda::CodaSource;
pub use file::{FileFormat, FileSource};

/// A table as returned by a source, before normalization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTable {
    /// Column titles in display order.
    pub columns: Vec<String>,
    /// Rows aligned with `columns`.
    pub rows: Vec<Vec<Value>>,
}

impl RawTable {
    /// Create a raw table.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }
}

/// Anything that can produce a full table read for a `(document_id, table_id)` pair.
pub trait DocumentSource {
    /// Fetch every row of `table_id` in `document_id`.
    fn get_table(&self, document_id: &str, table_id: &str) -> SourceResult<RawTable>;
}

impl<S: DocumentSource + ?Sized> DocumentSource for &S {
    fn get_table(&self, document_id: &str, table_id: &str) -> SourceResult<RawTable> {
        (**self).get_table(document_id, table_id)
    }
}

impl<S: DocumentSource + ?Sized> DocumentSource for Box<S> {
    fn get_table(&self, document_id: &str, table_id: &str) -> SourceResult<RawTable> {
        (**self).get_table(document_id, table_id)
    }
}

/// Convert a JSON scalar into a [`Value`] without reinterpreting it.
///
/// Integers that fit `i64` become [`Value::Int64`], other numbers [`Value::Float64`]. Arrays and
/// objects have no scalar form and are kept as their JSON text.
pub(crate) fn value_from_json(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int64(i),
            None => n.as_f64().map(Value::Float64).unwrap_or(Value::Null),
        },
        serde_json::Value::String(s) => Value::Utf8(s.clone()),
        other => Value::Utf8(other.to_string()),
    }
}
