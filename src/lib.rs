//! `tablesync` pulls tables out of collaborative documents (Coda, or CSV/JSON exports on disk)
//! and synchronizes them into a SQL warehouse.
//!
//! The core path has two steps:
//!
//! 1. **Extract** ([`extract::Extractor`]): a full read of one document table into an in-memory
//!    [`types::Snapshot`], with column names normalized to relational identifiers
//!    (`"Product Code"` becomes `product_code`).
//! 2. **Upsert** ([`upsert::StagedUpserter`]): stage the snapshot in a per-run table, delete the
//!    target rows whose key is in the snapshot, insert the staged rows, drop the staging table.
//!    All in one transaction: the target is either fully updated or left as it was.
//!
//! A merge-style variant ([`upsert::MergeUpserter`]) keeps a persistent staging table and uses a
//! conditional merge on a composite key instead.
//!
//! ## Running a batch
//!
//! [`pipeline::Pipeline`] runs both steps for every table of a [`config::SyncConfig`], one table
//! at a time, and keeps going when a table fails.
//!
//! ```no_run
//! use tablesync::config::{SyncConfig, WarehouseConfig};
//! use tablesync::pipeline::Pipeline;
//! use tablesync::source::FileSource;
//!
//! # fn main() -> Result<(), tablesync::SyncError> {
//! let config = SyncConfig::load("sync.toml")?;
//! let pipeline = Pipeline::new(FileSource::new("exports"), WarehouseConfig::sqlite("dw.sqlite"));
//!
//! let report = pipeline.run(&config)?;
//! println!("synced={} skipped={} failed={}", report.synced(), report.skipped(), report.failed());
//! # Ok(())
//! # }
//! ```
//!
//! ## Upserting a snapshot directly
//!
//! ```rust
//! use tablesync::types::{Snapshot, Value};
//! use tablesync::upsert::{StagedUpserter, UpsertOutcome};
//! use tablesync::warehouse::{SqliteWarehouse, TableName, Warehouse};
//!
//! let mut wh = SqliteWarehouse::open_in_memory().unwrap();
//! wh.execute("CREATE TABLE skus (sku TEXT, tier INTEGER)", &[]).unwrap();
//!
//! let snapshot = Snapshot::from_rows(
//!     vec!["sku".into(), "tier".into()],
//!     vec![vec![Value::from("A-1"), Value::Int64(2)]],
//! );
//! let outcome = StagedUpserter::default()
//!     .upsert(&mut wh, &snapshot, &TableName::unqualified("skus"), &["sku"])
//!     .unwrap();
//! assert!(matches!(outcome, UpsertOutcome::Applied(_)));
//! ```
//!
//! ## Modules
//!
//! - [`source`]: document sources (Coda API, local files)
//! - [`extract`] / [`normalize`]: snapshot extraction and column-name normalization
//! - [`warehouse`]: warehouse trait, SQL dialects, SQLite and Redshift backends
//! - [`upsert`]: staged replace-by-key and merge-style syncs
//! - [`pipeline`]: batch runner with [`observability`] hooks
//! - [`export`]: CSV output of snapshots
//! - [`query`]: parameterized warehouse lookups
//! - [`page`]: field extraction from JSON APIs and HTML pages
//! - [`failures`]: parsing of provisioning failure logs
//! - [`config`] / [`logging`]: run configuration and `tracing` setup
//! - [`error`]: error types

pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod failures;
pub mod logging;
pub mod normalize;
pub mod observability;
pub mod page;
pub mod pipeline;
pub mod query;
pub mod source;
pub mod types;
pub mod upsert;
pub mod warehouse;

pub use error::{SyncError, SyncResult};
