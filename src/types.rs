//! Core data model types.
//!
//! Every source is read into an in-memory [`Snapshot`]: an ordered list of rows whose cells are
//! [`Value`]s, described by a [`Schema`] (a list of typed [`Field`]s). The field types are
//! inferred from the values the source returned; they drive staging-table DDL and parameter
//! binding on the warehouse side.

use std::fmt;

/// Logical data type for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Utf8,
}

impl DataType {
    /// The narrowest type able to hold both `self` and `other`.
    ///
    /// Integers widen to floats; any other mixture falls back to [`DataType::Utf8`].
    pub fn widen(self, other: DataType) -> DataType {
        match (self, other) {
            (a, b) if a == b => a,
            (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
                DataType::Float64
            }
            _ => DataType::Utf8,
        }
    }
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// An ordered list of fields describing the shape of a [`Snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Whether a field with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema has no fields at all.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A single scalar cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
}

impl Value {
    /// Whether this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The data type carried by this value (`None` for nulls).
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float64(_) => Some(DataType::Float64),
            Value::Bool(_) => Some(DataType::Bool),
            Value::Utf8(_) => Some(DataType::Utf8),
        }
    }

    /// Convert this value so it can be stored in a column of type `target`.
    ///
    /// Only the conversions produced by [`DataType::widen`] are needed: integers into float
    /// columns, and anything into text columns.
    pub fn coerce_to(&self, target: DataType) -> Value {
        match (self, target) {
            (Value::Null, _) => Value::Null,
            (Value::Int64(v), DataType::Float64) => Value::Float64(*v as f64),
            (Value::Utf8(_), DataType::Utf8) => self.clone(),
            (v, DataType::Utf8) => Value::Utf8(v.to_string()),
            (v, _) => v.clone(),
        }
    }

    /// A string that is equal for equal values and distinct across types.
    ///
    /// Used to detect duplicate reconciliation keys (floats are not `Hash`).
    pub fn key_repr(&self) -> String {
        match self {
            // -0.0 and 0.0 compare equal in SQL.
            Value::Float64(v) => format!("{:?}", Value::Float64(v + 0.0)),
            other => format!("{other:?}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Utf8(v) => f.write_str(v),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Utf8(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Utf8(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A full table read taken at one point in time.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the [`Schema`] fields. A snapshot
/// has no identity beyond the run that produced it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    /// Schema describing row shape.
    pub schema: Schema,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
}

impl Snapshot {
    /// Create a snapshot from schema and rows.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Create a snapshot from column names and rows, inferring each field's type.
    ///
    /// Short rows are padded with nulls; extra cells are dropped.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        let rows: Vec<Vec<Value>> = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Null);
                row
            })
            .collect();

        let fields = columns
            .into_iter()
            .enumerate()
            .map(|(idx, name)| Field::new(name, infer_column_type(&rows, idx)))
            .collect();

        Self {
            schema: Schema::new(fields),
            rows,
        }
    }

    /// Number of rows in the snapshot.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether the snapshot holds zero rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Vec<&str> {
        self.schema.field_names().collect()
    }

    /// Cell at (`row`, `column`), if both exist.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.schema.index_of(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// New snapshot restricted to `columns` (in the given order). Unknown names are skipped.
    pub fn select(&self, columns: &[&str]) -> Snapshot {
        let idxs: Vec<usize> = columns
            .iter()
            .filter_map(|c| self.schema.index_of(c))
            .collect();
        let fields = idxs.iter().map(|&i| self.schema.fields[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| idxs.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Snapshot::new(Schema::new(fields), rows)
    }

    /// Replace empty strings and the literal `"null"` with [`Value::Null`], then re-infer types.
    pub fn nullify_blanks(&self) -> Snapshot {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|v| match v {
                        Value::Utf8(s) if s.is_empty() || s == "null" => Value::Null,
                        other => other.clone(),
                    })
                    .collect()
            })
            .collect();
        Snapshot::from_rows(
            self.schema.field_names().map(str::to_string).collect(),
            rows,
        )
    }
}

/// Infer the type of column `idx`: the widening of all non-null values, `Utf8` when all null.
fn infer_column_type(rows: &[Vec<Value>], idx: usize) -> DataType {
    rows.iter()
        .filter_map(|row| row.get(idx).and_then(Value::data_type))
        .reduce(DataType::widen)
        .unwrap_or(DataType::Utf8)
}
