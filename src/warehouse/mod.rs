//! Warehouse clients.
//!
//! The sync procedures only need a small, blocking surface from a warehouse: execute a
//! statement, run a query, and control a transaction. That surface is the [`Warehouse`] trait;
//! SQL text differences between backends live in [`dialect::Dialect`].
//!
//! Backends:
//! - [`sqlite::SqliteWarehouse`]: embedded database file (always available)
//! - `redshift::RedshiftWarehouse`: Redshift / Postgres over the wire (feature `redshift`)
//!
//! Values are always passed as bound parameters. Identifiers are quoted by the dialect.

pub mod dialect;
#[cfg(feature = "redshift")]
pub mod redshift;
pub mod sqlite;

use std::fmt;

use crate::config::{ConnectionKind, WarehouseConfig};
use crate::error::{SyncResult, WarehouseError, WarehouseResult};
use crate::types::{Snapshot, Value};

pub use dialect::Dialect;
pub use sqlite::SqliteWarehouse;

/// A possibly schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    /// Schema (Postgres/Redshift) or attached database (SQLite).
    pub schema: Option<String>,
    /// Table name.
    pub name: String,
}

impl TableName {
    /// Create a table name.
    pub fn new(schema: Option<String>, name: impl Into<String>) -> Self {
        Self {
            schema,
            name: name.into(),
        }
    }

    /// A table name without schema.
    pub fn unqualified(name: impl Into<String>) -> Self {
        Self::new(None, name)
    }

    /// Parse `schema.table` or `table`.
    pub fn parse(qualified: &str) -> Self {
        match qualified.split_once('.') {
            Some((schema, name)) => Self::new(Some(schema.to_string()), name),
            None => Self::unqualified(qualified),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A blocking connection to a SQL warehouse.
pub trait Warehouse {
    /// SQL dialect spoken by this connection.
    fn dialect(&self) -> Dialect;

    /// Execute a statement, returning the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> WarehouseResult<u64>;

    /// Run a query and collect its result set.
    fn query(&mut self, sql: &str, params: &[Value]) -> WarehouseResult<Snapshot>;

    /// Open a transaction.
    fn begin(&mut self) -> WarehouseResult<()> {
        self.execute("BEGIN", &[]).map(|_| ())
    }

    /// Commit the open transaction.
    fn commit(&mut self) -> WarehouseResult<()> {
        self.execute("COMMIT", &[]).map(|_| ())
    }

    /// Roll back the open transaction.
    fn rollback(&mut self) -> WarehouseResult<()> {
        self.execute("ROLLBACK", &[]).map(|_| ())
    }

    /// Whether `table` exists.
    fn table_exists(&mut self, table: &TableName) -> WarehouseResult<bool>;

    /// Close the connection.
    fn close(self: Box<Self>) -> WarehouseResult<()>;
}

/// Opens warehouse connections on demand.
pub trait Connector {
    /// Open a new connection.
    fn connect(&self) -> WarehouseResult<Box<dyn Warehouse>>;

    /// Reject settings that can never connect, before any table is extracted.
    fn validate(&self) -> SyncResult<()> {
        Ok(())
    }
}

impl<F> Connector for F
where
    F: Fn() -> WarehouseResult<Box<dyn Warehouse>>,
{
    fn connect(&self) -> WarehouseResult<Box<dyn Warehouse>> {
        self()
    }
}

impl Connector for WarehouseConfig {
    fn validate(&self) -> SyncResult<()> {
        WarehouseConfig::validate(self)
    }

    fn connect(&self) -> WarehouseResult<Box<dyn Warehouse>> {
        match self.kind {
            ConnectionKind::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| WarehouseError::Unsupported {
                    message: "sqlite connection without a database path".to_string(),
                })?;
                tracing::info!(path = %path.display(), "opening sqlite warehouse");
                Ok(Box::new(SqliteWarehouse::open(path)?))
            }
            ConnectionKind::Redshift | ConnectionKind::Postgres => connect_network(self),
        }
    }
}

#[cfg(feature = "redshift")]
fn connect_network(config: &WarehouseConfig) -> WarehouseResult<Box<dyn Warehouse>> {
    tracing::info!(host = %config.host, port = config.port, database = %config.database, "connecting to warehouse");
    Ok(Box::new(redshift::RedshiftWarehouse::connect(config)?))
}

#[cfg(not(feature = "redshift"))]
fn connect_network(config: &WarehouseConfig) -> WarehouseResult<Box<dyn Warehouse>> {
    Err(WarehouseError::Unsupported {
        message: format!(
            "{:?} connections not enabled (enable cargo feature 'redshift')",
            config.kind
        ),
    })
}
