//! Batch runner: extract and sync every configured table, one after another.
//!
//! Each table is an independent unit of work. A failure (extraction, precondition, connection,
//! transaction) is reported to the observer and recorded in the [`PipelineReport`], and the run
//! moves on to the next table. Only an invalid [`SyncConfig`] or warehouse setting stops the run
//! before it starts.
//!
//! A fresh warehouse connection is opened per table and closed when that table is done,
//! whatever the outcome.

use std::fmt;
use std::sync::Arc;

use crate::config::{SyncConfig, SyncMode, TableSync};
use crate::error::{SyncError, SyncResult};
use crate::extract::Extractor;
use crate::observability::{Severity, SyncContext, SyncObserver, TracingObserver};
use crate::source::DocumentSource;
use crate::upsert::{
    MergeSpec, MergeUpserter, StagedUpserter, UpsertOptions, UpsertOutcome, UpsertReport,
    check_preconditions,
};
use crate::warehouse::Connector;

/// What happened to one table.
#[derive(Debug)]
pub enum TableOutcome {
    /// The snapshot was applied.
    Synced(UpsertReport),
    /// Nothing was done (e.g. the source table is empty).
    Skipped { reason: String },
    /// The table's sync failed; the target is unchanged.
    Failed { error: SyncError },
}

/// Outcome of one configured table.
#[derive(Debug)]
pub struct TableResult {
    pub context: SyncContext,
    pub outcome: TableOutcome,
}

/// Outcomes of a pipeline run, in configuration order.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub tables: Vec<TableResult>,
}

impl PipelineReport {
    pub fn synced(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Synced(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Failed { .. }))
    }

    /// Whether any table failed.
    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    fn count(&self, pred: impl Fn(&TableOutcome) -> bool) -> usize {
        self.tables.iter().filter(|t| pred(&t.outcome)).count()
    }
}

const EMPTY_SNAPSHOT: &str = "source table is empty";

/// Runs table syncs from a document source into a warehouse.
pub struct Pipeline<S, C> {
    extractor: Extractor<S>,
    connector: C,
    observer: Arc<dyn SyncObserver>,
    alert_at_or_above: Severity,
}

impl<S, C> fmt::Debug for Pipeline<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish_non_exhaustive()
    }
}

impl<S: DocumentSource, C: Connector> Pipeline<S, C> {
    /// Pipeline reading from `source` and writing through connections from `connector`.
    ///
    /// Events go to a [`TracingObserver`]; alerts fire for [`Severity::Critical`] failures.
    pub fn new(source: S, connector: C) -> Self {
        Self {
            extractor: Extractor::new(source),
            connector,
            observer: Arc::new(TracingObserver),
            alert_at_or_above: Severity::Critical,
        }
    }

    /// Report events to `observer` instead.
    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Severity at which [`SyncObserver::on_alert`] is called.
    pub fn with_alert_threshold(mut self, severity: Severity) -> Self {
        self.alert_at_or_above = severity;
        self
    }

    /// Sync every table in `config`.
    ///
    /// Fails only when `config` or the connector settings are invalid; per-table failures are in
    /// the report.
    pub fn run(&self, config: &SyncConfig) -> SyncResult<PipelineReport> {
        config.validate()?;
        self.connector.validate()?;

        let mut report = PipelineReport::default();
        for table in &config.tables {
            let context = SyncContext {
                document_id: table.document_id(config).unwrap_or_default().to_string(),
                table_id: table.table_id.clone(),
                target: table.target(),
            };

            let outcome = match self.sync_table(config, table) {
                Ok(UpsertOutcome::Applied(applied)) => {
                    self.observer.on_synced(&context, &applied);
                    TableOutcome::Synced(applied)
                }
                Ok(UpsertOutcome::SkippedEmpty) => {
                    self.observer.on_skipped(&context, EMPTY_SNAPSHOT);
                    TableOutcome::Skipped {
                        reason: EMPTY_SNAPSHOT.to_string(),
                    }
                }
                Err(error) => {
                    let severity = error.severity();
                    self.observer.on_failure(&context, severity, &error);
                    if severity >= self.alert_at_or_above {
                        self.observer.on_alert(&context, severity, &error);
                    }
                    TableOutcome::Failed { error }
                }
            };
            report.tables.push(TableResult { context, outcome });
        }

        tracing::info!(
            synced = report.synced(),
            skipped = report.skipped(),
            failed = report.failed(),
            "pipeline finished"
        );
        Ok(report)
    }

    /// Extract and sync a single table.
    pub fn sync_table(&self, config: &SyncConfig, table: &TableSync) -> SyncResult<UpsertOutcome> {
        let document_id = table.document_id(config).ok_or_else(|| {
            SyncError::config(format!("no document_id for table '{}'", table.table_id))
        })?;
        let target = table.target();

        let snapshot = self.extractor.extract(document_id, &table.table_id)?;
        // A source with no rows and no header (e.g. a `[]` JSON export) has no columns to
        // check keys against.
        if snapshot.is_empty() && snapshot.schema.is_empty() {
            return Ok(UpsertOutcome::SkippedEmpty);
        }
        check_preconditions(&snapshot, &target, table.key_columns.as_slice())?;
        if snapshot.is_empty() {
            return Ok(UpsertOutcome::SkippedEmpty);
        }

        let mut warehouse = self.connector.connect().map_err(SyncError::Connection)?;
        let result = match table.mode {
            SyncMode::Replace => StagedUpserter::new(UpsertOptions {
                staging_prefix: config.staging_prefix.clone(),
                batch_size: config.batch_size,
            })
            .upsert(warehouse.as_mut(), &snapshot, &target, table.key_columns.as_slice()),
            SyncMode::Merge => MergeUpserter::new(
                MergeSpec {
                    key_columns: table.key_columns.clone(),
                    value_columns: table.value_columns.clone(),
                    staging_schema: table.staging_schema.clone(),
                    blank_as_null: table.blank_as_null,
                },
                config.batch_size,
            )
            .merge(warehouse.as_mut(), &snapshot, &target),
        };

        if let Err(e) = warehouse.close() {
            tracing::warn!(table = %target, error = %e, "closing warehouse connection failed");
        }
        result
    }
}
