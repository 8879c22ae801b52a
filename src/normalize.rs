//! Column-name normalization.
//!
//! Source tables use human-facing column titles (`"Product Code"`, `" Brand ID "`). Before a
//! snapshot reaches the warehouse every name is turned into a canonical relational identifier:
//! surrounding whitespace stripped, lowercased, and each inner whitespace character replaced by
//! [`SEPARATOR`].

use std::collections::HashSet;

use crate::error::{SyncError, SyncResult};

/// Replacement for whitespace inside column names.
pub const SEPARATOR: char = '_';

/// Normalize a single column name.
///
/// ```
/// use tablesync::normalize::normalize_column_name;
///
/// assert_eq!(normalize_column_name("Product Code"), "product_code");
/// assert_eq!(normalize_column_name(" Brand ID "), "brand_id");
/// assert_eq!(normalize_column_name("SKU"), "sku");
/// ```
pub fn normalize_column_name(raw: &str) -> String {
    raw.trim()
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_whitespace() { SEPARATOR } else { c })
        .collect()
}

/// Normalize every column name, rejecting empty names and names that collide after
/// normalization (e.g. `"Brand ID"` and `"brand_id"`).
pub fn normalize_columns<S: AsRef<str>>(raw: &[S]) -> SyncResult<Vec<String>> {
    let mut seen = HashSet::with_capacity(raw.len());
    let mut out = Vec::with_capacity(raw.len());

    for (idx, name) in raw.iter().enumerate() {
        let normalized = normalize_column_name(name.as_ref());
        if normalized.is_empty() {
            return Err(SyncError::SchemaMismatch {
                message: format!("column {} has an empty name", idx + 1),
            });
        }
        if !seen.insert(normalized.clone()) {
            return Err(SyncError::SchemaMismatch {
                message: format!(
                    "column '{}' collides with another column after normalization ('{normalized}')",
                    name.as_ref()
                ),
            });
        }
        out.push(normalized);
    }

    Ok(out)
}
