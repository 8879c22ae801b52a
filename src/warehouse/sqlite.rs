//! Embedded SQLite warehouse.

use std::path::Path;

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{Connection, params_from_iter};

use crate::error::{WarehouseError, WarehouseResult};
use crate::types::{Snapshot, Value};

use super::{Dialect, TableName, Warehouse};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Int64(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            Value::Float64(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            Value::Bool(v) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*v))),
            Value::Utf8(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// A warehouse stored in a SQLite database file.
#[derive(Debug)]
pub struct SqliteWarehouse {
    conn: Connection,
}

impl SqliteWarehouse {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> WarehouseResult<Self> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> WarehouseResult<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Warehouse for SqliteWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> WarehouseResult<u64> {
        let changed = self.conn.execute(sql, params_from_iter(params.iter()))?;
        Ok(changed as u64)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> WarehouseResult<Snapshot> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();

        let mut out = Vec::new();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                values.push(match row.get_ref(idx)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(v) => Value::Int64(v),
                    ValueRef::Real(v) => Value::Float64(v),
                    ValueRef::Text(t) => Value::Utf8(String::from_utf8_lossy(t).into_owned()),
                    ValueRef::Blob(b) => {
                        return Err(WarehouseError::Decode {
                            column: name.clone(),
                            message: format!("blob of {} bytes has no scalar form", b.len()),
                        });
                    }
                });
            }
            out.push(values);
        }

        Ok(Snapshot::from_rows(columns, out))
    }

    fn table_exists(&mut self, table: &TableName) -> WarehouseResult<bool> {
        let catalog = match &table.schema {
            Some(schema) => format!("{}.sqlite_master", Dialect::Sqlite.quote_ident(schema)),
            None => "sqlite_master".to_string(),
        };
        let sql = format!("SELECT 1 FROM {catalog} WHERE type = 'table' AND name = ?1");
        let found = self.query(&sql, &[Value::from(table.name.as_str())])?;
        Ok(!found.is_empty())
    }

    fn close(self: Box<Self>) -> WarehouseResult<()> {
        self.conn.close().map_err(|(_, e)| WarehouseError::Sqlite(e))
    }
}
