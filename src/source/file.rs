//! Local file source.
//!
//! Treats a directory tree as a set of documents: table `table_id` of document `document_id` is
//! the file `<root>/<document_id>/<table_id>.<ext>`, where the extension selects the format.
//! This is how exported tables are replayed offline (and how the pipeline is exercised in tests).
//!
//! Supported inputs:
//! - CSV with a header row (`.csv`)
//! - A JSON array of objects, a single object, or newline-delimited objects (`.json`, `.ndjson`)

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{SourceError, SourceResult};
use crate::types::Value;

use super::{DocumentSource, RawTable, value_from_json};

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Comma-separated values with a header row.
    Csv,
    /// JSON array-of-objects or NDJSON.
    Json,
}

impl FileFormat {
    /// Parse a format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" | "ndjson" => Some(Self::Json),
            _ => None,
        }
    }
}

const PROBE_EXTENSIONS: [&str; 3] = ["csv", "json", "ndjson"];

/// Reads tables from files below a root directory.
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    /// Create a source rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Resolve the file backing a table.
    ///
    /// `table_id` may carry its own extension; otherwise `.csv`, `.json` and `.ndjson` are
    /// probed in that order.
    pub fn locate(&self, document_id: &str, table_id: &str) -> SourceResult<(PathBuf, FileFormat)> {
        let dir = self.root.join(document_id);

        let explicit = dir.join(table_id);
        if explicit.is_file() {
            let format = explicit
                .extension()
                .and_then(|e| e.to_str())
                .and_then(FileFormat::from_extension)
                .ok_or_else(|| SourceError::UnsupportedFormat {
                    message: format!("cannot infer format for ({})", explicit.display()),
                })?;
            return Ok((explicit, format));
        }

        for ext in PROBE_EXTENSIONS {
            let candidate = dir.join(format!("{table_id}.{ext}"));
            if candidate.is_file() {
                if let Some(format) = FileFormat::from_extension(ext) {
                    return Ok((candidate, format));
                }
            }
        }

        Err(SourceError::NotFound {
            document_id: document_id.to_string(),
            table_id: table_id.to_string(),
        })
    }
}

impl DocumentSource for FileSource {
    fn get_table(&self, document_id: &str, table_id: &str) -> SourceResult<RawTable> {
        let (path, format) = self.locate(document_id, table_id)?;
        tracing::info!(path = %path.display(), ?format, "loading table file");
        match format {
            FileFormat::Csv => {
                let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_path(&path)?;
                read_csv(&mut rdr)
            }
            FileFormat::Json => read_json_str(&fs::read_to_string(&path)?),
        }
    }
}

/// Read a CSV table from an existing reader. The header row supplies the column titles.
pub fn read_csv<R: std::io::Read>(rdr: &mut csv::Reader<R>) -> SourceResult<RawTable> {
    let columns: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(parse_scalar).collect());
    }

    Ok(RawTable::new(columns, rows))
}

/// Interpret a CSV cell.
///
/// Blank cells are null, `true`/`false` are booleans, canonically written integers (no sign
/// prefix, no leading zeros) are `Int64`, plain decimals are `Float64`. Everything else,
/// including zero-padded codes like `00123`, stays text.
pub fn parse_scalar(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }

    match trimmed.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if let Ok(i) = trimmed.parse::<i64>() {
        if i.to_string() == trimmed {
            return Value::Int64(i);
        }
        return Value::Utf8(raw.to_string());
    }

    if looks_decimal(trimmed) {
        if let Ok(f) = trimmed.parse::<f64>() {
            return Value::Float64(f);
        }
    }

    Value::Utf8(raw.to_string())
}

fn looks_decimal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let Some((int_part, frac_part)) = digits.split_once('.') else {
        return false;
    };
    let leading_zero = int_part.len() > 1 && int_part.starts_with('0');
    !int_part.is_empty()
        && !frac_part.is_empty()
        && !leading_zero
        && int_part.bytes().all(|b| b.is_ascii_digit())
        && frac_part.bytes().all(|b| b.is_ascii_digit())
}

/// Read a JSON table from an in-memory string.
///
/// Columns are the union of object keys in first-seen order; keys missing from an object are
/// null in that row.
pub fn read_json_str(input: &str) -> SourceResult<RawTable> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(RawTable::default());
    }

    // First try parsing as a single JSON value (array or object).
    let values = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Array(items)) => items,
        Ok(v @ serde_json::Value::Object(_)) => vec![v],
        Ok(_) => {
            return Err(SourceError::Malformed {
                message: "json must be an object, an array of objects, or NDJSON".to_string(),
            });
        }
        Err(_) => {
            // Fall back to NDJSON.
            let mut values = Vec::new();
            for (i, line) in trimmed.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let v = serde_json::from_str::<serde_json::Value>(line).map_err(|e| {
                    SourceError::Malformed {
                        message: format!("invalid ndjson at line {}: {}", i + 1, e),
                    }
                })?;
                values.push(v);
            }
            values
        }
    };

    let mut objects = Vec::with_capacity(values.len());
    let mut columns: Vec<String> = Vec::new();
    for (idx0, v) in values.iter().enumerate() {
        let obj = v.as_object().ok_or_else(|| SourceError::Malformed {
            message: format!("row {} is not a json object", idx0 + 1),
        })?;
        for key in obj.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
        objects.push(obj);
    }

    let rows = objects
        .iter()
        .map(|obj| {
            columns
                .iter()
                .map(|c| obj.get(c).map(value_from_json).unwrap_or(Value::Null))
                .collect()
        })
        .collect();

    Ok(RawTable::new(columns, rows))
}
