//! Redshift / Postgres warehouse over the Postgres wire protocol.
//!
//! The driver is async; each call is driven to completion on a private current-thread runtime
//! so the rest of the crate stays blocking. Transactions are plain `BEGIN`/`COMMIT`/`ROLLBACK`
//! statements on the single connection.

use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Executor, Postgres, Row, Statement, TypeInfo};
use tokio::runtime::{Builder, Runtime};

use crate::config::WarehouseConfig;
use crate::error::{WarehouseError, WarehouseResult};
use crate::types::{Snapshot, Value};

use super::{Dialect, TableName, Warehouse};

/// Schema searched by [`Warehouse::table_exists`] when a table name is unqualified.
const DEFAULT_SCHEMA: &str = "public";

/// A blocking Redshift connection.
pub struct RedshiftWarehouse {
    runtime: Runtime,
    conn: PgConnection,
}

impl RedshiftWarehouse {
    /// Connect with the parameters in `config`.
    pub fn connect(config: &WarehouseConfig) -> WarehouseResult<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);
        let conn = runtime.block_on(PgConnection::connect_with(&options))?;
        Ok(Self { runtime, conn })
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [Value],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            Value::Null => query.bind(Option::<String>::None),
            Value::Int64(v) => query.bind(*v),
            Value::Float64(v) => query.bind(*v),
            Value::Bool(v) => query.bind(*v),
            Value::Utf8(s) => query.bind(s.as_str()),
        };
    }
    query
}

fn decode_cell(row: &PgRow, idx: usize) -> WarehouseResult<Value> {
    let column = &row.columns()[idx];
    let decode_err = |e: sqlx::Error| WarehouseError::Decode {
        column: column.name().to_string(),
        message: e.to_string(),
    };

    let value = match column.type_info().name() {
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)
            .map_err(decode_err)?
            .map(|v| Value::Int64(v.into())),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)
            .map_err(decode_err)?
            .map(|v| Value::Int64(v.into())),
        "INT8" => row
            .try_get::<Option<i64>, _>(idx)
            .map_err(decode_err)?
            .map(Value::Int64),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)
            .map_err(decode_err)?
            .map(|v| Value::Float64(v.into())),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(idx)
            .map_err(decode_err)?
            .map(Value::Float64),
        "BOOL" => row
            .try_get::<Option<bool>, _>(idx)
            .map_err(decode_err)?
            .map(Value::Bool),
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" => row
            .try_get::<Option<String>, _>(idx)
            .map_err(decode_err)?
            .map(Value::Utf8),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)
            .map_err(decode_err)?
            .map(|d| Value::Utf8(d.to_string())),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
            .map_err(decode_err)?
            .map(|t| Value::Utf8(t.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
            .map_err(decode_err)?
            .map(|t| Value::Utf8(t.to_rfc3339())),
        other => {
            return Err(WarehouseError::Decode {
                column: column.name().to_string(),
                message: format!("unsupported column type {other} (cast it in the query)"),
            });
        }
    };

    Ok(value.unwrap_or(Value::Null))
}

impl Warehouse for RedshiftWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::Redshift
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> WarehouseResult<u64> {
        let Self { runtime, conn } = self;
        let done = runtime.block_on(bind_all(sqlx::query(sql), params).execute(&mut *conn))?;
        Ok(done.rows_affected())
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> WarehouseResult<Snapshot> {
        let Self { runtime, conn } = self;
        let (columns, rows) = runtime.block_on(async {
            let statement = (&mut *conn).prepare(sql).await?;
            let columns: Vec<String> = statement
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect();
            let rows = bind_all(sqlx::query(sql), params)
                .fetch_all(&mut *conn)
                .await?;
            Ok::<_, sqlx::Error>((columns, rows))
        })?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let values = (0..columns.len())
                .map(|idx| decode_cell(row, idx))
                .collect::<WarehouseResult<Vec<Value>>>()?;
            out.push(values);
        }
        Ok(Snapshot::from_rows(columns, out))
    }

    fn table_exists(&mut self, table: &TableName) -> WarehouseResult<bool> {
        let schema = table.schema.as_deref().unwrap_or(DEFAULT_SCHEMA);
        let found = self.query(
            "SELECT 1 AS present FROM information_schema.tables \
             WHERE table_schema = $1 AND table_name = $2",
            &[Value::from(schema), Value::from(table.name.as_str())],
        )?;
        Ok(!found.is_empty())
    }

    fn close(self: Box<Self>) -> WarehouseResult<()> {
        let Self { runtime, conn } = *self;
        runtime.block_on(conn.close())?;
        Ok(())
    }
}
