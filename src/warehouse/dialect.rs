//! SQL text generation per warehouse backend.
//!
//! Statement shapes used by the sync procedures:
//!
//! | statement            | SQLite                                  | Redshift                    |
//! |----------------------|-----------------------------------------|-----------------------------|
//! | placeholder          | `?N`                                    | `CAST($N AS <type>)`        |
//! | delete matched keys  | `DELETE ... WHERE EXISTS (SELECT 1 ..)` | `DELETE ... USING ...`      |
//! | create like target   | `CREATE TABLE .. AS SELECT * .. WHERE 0`| `CREATE TABLE .. (LIKE ..)` |
//! | merge                | `UPDATE .. FROM` + `INSERT .. SELECT`   | `MERGE INTO`                |
//!
//! Identifiers are always double-quoted; values never appear in SQL text.

use crate::types::{DataType, Schema};

use super::TableName;

/// SQL dialect of a warehouse connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Embedded SQLite.
    Sqlite,
    /// Amazon Redshift (also used for plain Postgres).
    Redshift,
}

/// Check that `name` can be used as a quoted identifier on every supported backend.
pub fn validate_identifier(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("identifier is empty".to_string());
    }
    if name.contains('\0') {
        return Err(format!("identifier {name:?} contains a NUL byte"));
    }
    let limit = Dialect::Redshift.max_identifier_len();
    if name.len() > limit {
        return Err(format!(
            "identifier '{name}' is {} bytes long (limit {limit})",
            name.len()
        ));
    }
    Ok(())
}

impl Dialect {
    /// Longest identifier accepted, in bytes.
    pub fn max_identifier_len(self) -> usize {
        match self {
            Dialect::Sqlite => 1024,
            Dialect::Redshift => 127,
        }
    }

    /// Most bound parameters accepted by a single statement.
    pub fn max_params(self) -> usize {
        match self {
            Dialect::Sqlite => 32_766,
            Dialect::Redshift => 32_767,
        }
    }

    /// Quote an identifier, doubling embedded quotes.
    pub fn quote_ident(self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Quoted, schema-qualified table reference.
    pub fn table(self, table: &TableName) -> String {
        match &table.schema {
            Some(schema) => format!("{}.{}", self.quote_ident(schema), self.quote_ident(&table.name)),
            None => self.quote_ident(&table.name),
        }
    }

    /// `"table"."column"`, using the unqualified table name as correlation name.
    fn column_of(self, table: &TableName, column: &str) -> String {
        format!("{}.{}", self.quote_ident(&table.name), self.quote_ident(column))
    }

    fn column_list<S: AsRef<str>>(self, columns: &[S]) -> String {
        columns
            .iter()
            .map(|c| self.quote_ident(c.as_ref()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn key_match<S: AsRef<str>>(self, left: &TableName, right: &TableName, keys: &[S]) -> String {
        keys.iter()
            .map(|k| {
                format!(
                    "{} = {}",
                    self.column_of(left, k.as_ref()),
                    self.column_of(right, k.as_ref())
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Column type used for staging tables.
    pub fn column_type(self, data_type: DataType) -> &'static str {
        match (self, data_type) {
            (Dialect::Sqlite, DataType::Int64) => "INTEGER",
            (Dialect::Sqlite, DataType::Float64) => "REAL",
            (Dialect::Sqlite, DataType::Bool) => "INTEGER",
            (Dialect::Sqlite, DataType::Utf8) => "TEXT",
            (Dialect::Redshift, DataType::Int64) => "BIGINT",
            (Dialect::Redshift, DataType::Float64) => "DOUBLE PRECISION",
            (Dialect::Redshift, DataType::Bool) => "BOOLEAN",
            (Dialect::Redshift, DataType::Utf8) => "VARCHAR(65535)",
        }
    }

    /// Positional placeholder for the `n`th (1-based) parameter.
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Dialect::Sqlite => format!("?{n}"),
            Dialect::Redshift => format!("${n}"),
        }
    }

    /// Placeholder whose type is fixed in SQL, so that null parameters bind correctly.
    pub fn typed_placeholder(self, n: usize, data_type: DataType) -> String {
        match self {
            Dialect::Sqlite => self.placeholder(n),
            Dialect::Redshift => format!("CAST(${n} AS {})", self.column_type(data_type)),
        }
    }

    /// `CREATE TABLE` with one column per schema field.
    pub fn create_table(self, table: &TableName, schema: &Schema) -> String {
        let columns = schema
            .fields
            .iter()
            .map(|f| format!("{} {}", self.quote_ident(&f.name), self.column_type(f.data_type)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE {} ({columns})", self.table(table))
    }

    /// `CREATE TABLE IF NOT EXISTS` copying the column layout of `like`.
    pub fn create_like_if_absent(self, table: &TableName, like: &TableName) -> String {
        match self {
            Dialect::Sqlite => format!(
                "CREATE TABLE IF NOT EXISTS {} AS SELECT * FROM {} WHERE 0",
                self.table(table),
                self.table(like)
            ),
            Dialect::Redshift => format!(
                "CREATE TABLE IF NOT EXISTS {} (LIKE {})",
                self.table(table),
                self.table(like)
            ),
        }
    }

    pub fn drop_table_if_exists(self, table: &TableName) -> String {
        format!("DROP TABLE IF EXISTS {}", self.table(table))
    }

    /// Delete every row of `table`.
    pub fn clear_table(self, table: &TableName) -> String {
        format!("DELETE FROM {}", self.table(table))
    }

    /// Multi-row `INSERT ... VALUES` for `rows` rows of `schema`.
    pub fn insert_values(self, table: &TableName, schema: &Schema, rows: usize) -> String {
        let names: Vec<&str> = schema.field_names().collect();
        let width = schema.len();
        let tuples = (0..rows)
            .map(|r| {
                let cells = schema
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(c, f)| self.typed_placeholder(r * width + c + 1, f.data_type))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({cells})")
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES {tuples}",
            self.table(table),
            self.column_list(&names)
        )
    }

    /// Delete rows of `target` whose key tuple appears in `staging`.
    pub fn delete_matching<S: AsRef<str>>(
        self,
        target: &TableName,
        staging: &TableName,
        keys: &[S],
    ) -> String {
        let on = self.key_match(target, staging, keys);
        match self {
            Dialect::Sqlite => format!(
                "DELETE FROM {} WHERE EXISTS (SELECT 1 FROM {} WHERE {on})",
                self.table(target),
                self.table(staging)
            ),
            Dialect::Redshift => format!(
                "DELETE FROM {} USING {} WHERE {on}",
                self.table(target),
                self.table(staging)
            ),
        }
    }

    /// Copy `columns` of every row of `source` into `target`.
    pub fn insert_select<S: AsRef<str>>(
        self,
        target: &TableName,
        source: &TableName,
        columns: &[S],
    ) -> String {
        let cols = self.column_list(columns);
        format!(
            "INSERT INTO {} ({cols}) SELECT {cols} FROM {}",
            self.table(target),
            self.table(source)
        )
    }

    /// Statements merging `staging` into `target` on `keys`.
    ///
    /// Matched rows get `update_columns` overwritten; unmatched staging rows are inserted with
    /// `insert_columns`. When there is nothing to update, matched rows are left as they are.
    pub fn merge<S: AsRef<str>>(
        self,
        target: &TableName,
        staging: &TableName,
        keys: &[S],
        update_columns: &[S],
        insert_columns: &[S],
    ) -> Vec<String> {
        let on = self.key_match(target, staging, keys);
        let assignments = |cols: &[S]| {
            cols.iter()
                .map(|c| {
                    format!(
                        "{} = {}",
                        self.quote_ident(c.as_ref()),
                        self.column_of(staging, c.as_ref())
                    )
                })
                .collect::<Vec<_>>()
                .join(", ")
        };
        let insert_cols = self.column_list(insert_columns);
        let staged_values = insert_columns
            .iter()
            .map(|c| self.column_of(staging, c.as_ref()))
            .collect::<Vec<_>>()
            .join(", ");

        match self {
            Dialect::Redshift => {
                // MERGE needs a WHEN MATCHED action; rewriting the keys is a no-op.
                let set = if update_columns.is_empty() {
                    assignments(keys)
                } else {
                    assignments(update_columns)
                };
                vec![format!(
                    "MERGE INTO {} USING {} ON {on} \
                     WHEN MATCHED THEN UPDATE SET {set} \
                     WHEN NOT MATCHED THEN INSERT ({insert_cols}) VALUES ({staged_values})",
                    self.table(target),
                    self.table(staging)
                )]
            }
            Dialect::Sqlite => {
                let mut statements = Vec::with_capacity(2);
                if !update_columns.is_empty() {
                    statements.push(format!(
                        "UPDATE {} SET {} FROM {} WHERE {on}",
                        self.table(target),
                        assignments(update_columns),
                        self.table(staging)
                    ));
                }
                statements.push(format!(
                    "INSERT INTO {} ({insert_cols}) SELECT {staged_values} FROM {} \
                     WHERE NOT EXISTS (SELECT 1 FROM {} WHERE {on})",
                    self.table(target),
                    self.table(staging),
                    self.table(target)
                ));
                statements
            }
        }
    }
}
