//! Run configuration.
//!
//! Everything a sync run needs is passed in explicitly:
//!
//! - [`SyncConfig`]: which tables to pull and where to put them, read from a TOML file
//! - [`WarehouseConfig`]: warehouse connection parameters, read from the environment
//! - [`CodaConfig`]: the Coda API token, read from the environment
//!
//! All validation happens here, before any network or database I/O.
//!
//! ```
//! use tablesync::config::{SyncConfig, SyncMode};
//!
//! let cfg = SyncConfig::from_toml_str(r#"
//!     document_id = "m6G_7OVfdq"
//!
//!     [[tables]]
//!     table_id = "table-RC54btGLAp"
//!     target_table = "sku_privileges"
//!     key_columns = ["privilege_id"]
//! "#).unwrap();
//!
//! assert_eq!(cfg.tables[0].mode, SyncMode::Replace);
//! assert_eq!(cfg.tables[0].document_id(&cfg), Some("m6G_7OVfdq"));
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{SyncError, SyncResult};
use crate::source::coda::DEFAULT_API_BASE;
use crate::warehouse::TableName;
use crate::warehouse::dialect::validate_identifier;

/// Environment variable holding the Coda API token.
pub const CODA_TOKEN_VAR: &str = "CODA_TOKEN";
/// Environment variable overriding the Coda API base URL.
pub const CODA_API_BASE_VAR: &str = "CODA_API_BASE";

/// Environment variable selecting the warehouse backend.
pub const WAREHOUSE_CONNECTION_VAR: &str = "WAREHOUSE_CONNECTION";
pub const WAREHOUSE_USER_VAR: &str = "WAREHOUSE_USER";
pub const WAREHOUSE_PASSWORD_VAR: &str = "WAREHOUSE_PASSWORD";
pub const WAREHOUSE_HOST_VAR: &str = "WAREHOUSE_HOST";
pub const WAREHOUSE_PORT_VAR: &str = "WAREHOUSE_PORT";
pub const WAREHOUSE_DB_VAR: &str = "WAREHOUSE_DB";
pub const WAREHOUSE_PATH_VAR: &str = "WAREHOUSE_PATH";

/// Default Redshift port.
pub const DEFAULT_PORT: u16 = 5439;
/// Default database name.
pub const DEFAULT_DATABASE: &str = "warehouse";
/// Default prefix of per-run staging tables.
pub const DEFAULT_STAGING_PREFIX: &str = "coda_staging";
/// Default number of rows per staging insert statement.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Coda API credentials.
#[derive(Clone)]
pub struct CodaConfig {
    /// Bearer token.
    pub token: String,
    /// API base URL (defaults to [`DEFAULT_API_BASE`]).
    pub api_base: String,
}

impl fmt::Debug for CodaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodaConfig")
            .field("token", &"<redacted>")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl CodaConfig {
    /// Read [`CODA_TOKEN_VAR`] / [`CODA_API_BASE_VAR`] from the process environment.
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(env_lookup)
    }

    /// Same as [`Self::from_env`] with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> SyncResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup(CODA_TOKEN_VAR)
            .ok_or_else(|| SyncError::config(format!("{CODA_TOKEN_VAR} is missing")))?;
        Ok(Self {
            token,
            api_base: lookup(CODA_API_BASE_VAR).unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        })
    }
}

/// Warehouse backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// Amazon Redshift (Postgres wire protocol).
    Redshift,
    /// Plain Postgres.
    Postgres,
    /// Embedded SQLite database file.
    Sqlite,
}

impl FromStr for ConnectionKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redshift" => Ok(Self::Redshift),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(SyncError::config(format!(
                "unsupported connection type '{other}' (expected redshift, postgres or sqlite)"
            ))),
        }
    }
}

impl ConnectionKind {
    /// Whether this build can open connections of this kind.
    ///
    /// Redshift and Postgres need the `redshift` cargo feature.
    pub fn is_enabled(self) -> bool {
        match self {
            ConnectionKind::Sqlite => true,
            ConnectionKind::Redshift | ConnectionKind::Postgres => cfg!(feature = "redshift"),
        }
    }
}

/// Warehouse connection parameters.
#[derive(Clone)]
pub struct WarehouseConfig {
    pub kind: ConnectionKind,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    /// Database file for [`ConnectionKind::Sqlite`].
    pub path: Option<PathBuf>,
}

impl fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("kind", &self.kind)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("path", &self.path)
            .finish()
    }
}

impl WarehouseConfig {
    /// Configuration for an embedded SQLite warehouse stored at `path`.
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        Self {
            kind: ConnectionKind::Sqlite,
            user: String::new(),
            password: String::new(),
            host: String::new(),
            port: 0,
            database: String::new(),
            path: Some(path.as_ref().to_path_buf()),
        }
    }

    /// Reject parameters this build cannot connect with.
    pub fn validate(&self) -> SyncResult<()> {
        check_enabled(self.kind)?;
        if self.kind == ConnectionKind::Sqlite && self.path.is_none() {
            return Err(SyncError::config(format!("{WAREHOUSE_PATH_VAR} is required for sqlite")));
        }
        Ok(())
    }

    /// Read the `WAREHOUSE_*` variables from the process environment.
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(env_lookup)
    }

    /// Same as [`Self::from_env`] with an injectable lookup.
    ///
    /// Every missing required parameter is reported in one error.
    pub fn from_lookup<F>(lookup: F) -> SyncResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let kind = match lookup(WAREHOUSE_CONNECTION_VAR) {
            Some(v) => v.parse::<ConnectionKind>()?,
            None => ConnectionKind::Redshift,
        };
        check_enabled(kind)?;

        if kind == ConnectionKind::Sqlite {
            let path = lookup(WAREHOUSE_PATH_VAR).ok_or_else(|| {
                SyncError::config(format!("{WAREHOUSE_PATH_VAR} is required for sqlite"))
            })?;
            return Ok(Self::sqlite(path));
        }

        let mut missing = Vec::new();
        let mut required = |name: &'static str| {
            lookup(name).unwrap_or_else(|| {
                missing.push(name);
                String::new()
            })
        };
        let user = required(WAREHOUSE_USER_VAR);
        let password = required(WAREHOUSE_PASSWORD_VAR);
        let host = required(WAREHOUSE_HOST_VAR);

        if !missing.is_empty() {
            return Err(SyncError::config(format!(
                "missing warehouse connection parameters: {}",
                missing.join(", ")
            )));
        }

        let port = match lookup(WAREHOUSE_PORT_VAR) {
            Some(p) => p.trim().parse::<u16>().map_err(|e| {
                SyncError::config(format!("invalid {WAREHOUSE_PORT_VAR} '{p}': {e}"))
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            kind,
            user,
            password,
            host,
            port,
            database: lookup(WAREHOUSE_DB_VAR).unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            path: None,
        })
    }
}

/// How a table's snapshot is reconciled into its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Per-run staging table, delete matched keys, insert all staged rows.
    #[default]
    Replace,
    /// Persistent staging table and a conditional merge on the key columns.
    Merge,
}

/// One table to sync.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TableSync {
    /// Source document; falls back to [`SyncConfig::document_id`].
    #[serde(default)]
    pub document_id: Option<String>,
    /// Source table id (or name) inside the document.
    pub table_id: String,
    /// Warehouse table receiving the rows.
    pub target_table: String,
    /// Warehouse schema of the target (backend default when absent).
    #[serde(default)]
    pub schema: Option<String>,
    /// Reconciliation key, in normalized column names.
    pub key_columns: Vec<String>,
    #[serde(default)]
    pub mode: SyncMode,
    /// Merge mode: schema of the persistent staging table (defaults to the target's schema).
    #[serde(default)]
    pub staging_schema: Option<String>,
    /// Merge mode: columns updated on match.
    #[serde(default)]
    pub value_columns: Vec<String>,
    /// Treat empty strings and the literal `"null"` as nulls before loading.
    #[serde(default)]
    pub blank_as_null: bool,
}

impl TableSync {
    /// The document this table lives in.
    pub fn document_id<'a>(&'a self, config: &'a SyncConfig) -> Option<&'a str> {
        self.document_id
            .as_deref()
            .or(config.document_id.as_deref())
    }

    /// Qualified target table name.
    pub fn target(&self) -> TableName {
        TableName::new(self.schema.clone(), self.target_table.clone())
    }
}

fn check_enabled(kind: ConnectionKind) -> SyncResult<()> {
    if kind.is_enabled() {
        return Ok(());
    }
    Err(SyncError::config(format!(
        "{kind:?} connections are not available in this build (enable cargo feature 'redshift')"
    )))
}

fn default_staging_prefix() -> String {
    DEFAULT_STAGING_PREFIX.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// A batch of table syncs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// Document shared by tables that do not name their own.
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default = "default_staging_prefix")]
    pub staging_prefix: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    pub tables: Vec<TableSync>,
}

impl SyncConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> SyncResult<Self> {
        let cfg: SyncConfig = toml::from_str(input)
            .map_err(|e| SyncError::config(format!("invalid sync config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            SyncError::config(format!("cannot read config ({}): {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check everything that can be checked without I/O.
    pub fn validate(&self) -> SyncResult<()> {
        if self.tables.is_empty() {
            return Err(SyncError::config("no tables configured"));
        }
        if self.batch_size == 0 {
            return Err(SyncError::config("batch_size must be > 0"));
        }
        validate_identifier(&self.staging_prefix)
            .map_err(|m| SyncError::config(format!("staging_prefix: {m}")))?;

        for (idx, table) in self.tables.iter().enumerate() {
            let label = format!("tables[{idx}] ({})", table.target_table);
            let bad = |m: String| SyncError::config(format!("{label}: {m}"));

            if table.document_id(self).is_none() {
                return Err(bad("no document_id (set it on the table or at the top level)".into()));
            }
            if table.table_id.trim().is_empty() {
                return Err(bad("table_id is empty".into()));
            }
            validate_identifier(&table.target_table).map_err(|m| bad(format!("target_table: {m}")))?;
            if let Some(schema) = &table.schema {
                validate_identifier(schema).map_err(|m| bad(format!("schema: {m}")))?;
            }
            if table.key_columns.is_empty() {
                return Err(bad("key_columns must not be empty".into()));
            }
            for key in &table.key_columns {
                validate_identifier(key).map_err(|m| bad(format!("key column: {m}")))?;
            }

            if table.mode == SyncMode::Merge {
                if table.value_columns.is_empty() {
                    return Err(bad("merge mode requires value_columns".into()));
                }
                for col in &table.value_columns {
                    validate_identifier(col).map_err(|m| bad(format!("value column: {m}")))?;
                }
                if let Some(schema) = &table.staging_schema {
                    validate_identifier(schema).map_err(|m| bad(format!("staging_schema: {m}")))?;
                }
            }
        }

        Ok(())
    }
}
