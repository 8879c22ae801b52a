use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{PageError, SourceError, SyncError};
use crate::upsert::UpsertReport;
use crate::warehouse::TableName;

/// How bad a sync failure is; drives [`SyncObserver::on_alert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational event.
    Info,
    /// Non-fatal problem.
    Warning,
    /// One table's sync failed.
    Error,
    /// Infrastructure failure (credentials, network, warehouse); likely affects every table.
    Critical,
}

impl SyncError {
    /// How serious this failure is.
    pub fn severity(&self) -> Severity {
        match self {
            SyncError::Config { .. } => Severity::Critical,
            SyncError::Extraction { source, .. } => match source {
                SourceError::MissingCredential { .. }
                | SourceError::Auth { .. }
                | SourceError::Transport(_)
                | SourceError::Io(_) => Severity::Critical,
                SourceError::Csv(err) => match err.kind() {
                    ::csv::ErrorKind::Io(_) => Severity::Critical,
                    _ => Severity::Error,
                },
                _ => Severity::Error,
            },
            SyncError::SchemaMismatch { .. } | SyncError::Precondition { .. } => Severity::Error,
            SyncError::Connection(_) | SyncError::Transaction { .. } => Severity::Critical,
            SyncError::Query(_) => Severity::Error,
            SyncError::Page(PageError::Transport(_)) => Severity::Error,
            SyncError::Page(_) => Severity::Warning,
            SyncError::Csv(err) => match err.kind() {
                ::csv::ErrorKind::Io(_) => Severity::Critical,
                _ => Severity::Error,
            },
            SyncError::Io(_) => Severity::Critical,
        }
    }
}

/// The table a sync event is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncContext {
    pub document_id: String,
    pub table_id: String,
    pub target: TableName,
}

/// Observer interface for per-table sync outcomes.
///
/// Implementors can record metrics, write logs, or raise alerts.
pub trait SyncObserver: Send + Sync {
    /// Called when a table was synced.
    fn on_synced(&self, _ctx: &SyncContext, _report: &UpsertReport) {}

    /// Called when a table was skipped (e.g. empty snapshot).
    fn on_skipped(&self, _ctx: &SyncContext, _reason: &str) {}

    /// Called when a table's sync failed.
    fn on_failure(&self, _ctx: &SyncContext, _severity: Severity, _error: &SyncError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Forwards to [`Self::on_failure`] unless overridden.
    fn on_alert(&self, ctx: &SyncContext, severity: Severity, error: &SyncError) {
        self.on_failure(ctx, severity, error)
    }
}

/// Fans callbacks out to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn SyncObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn SyncObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl SyncObserver for CompositeObserver {
    fn on_synced(&self, ctx: &SyncContext, report: &UpsertReport) {
        for o in &self.observers {
            o.on_synced(ctx, report);
        }
    }

    fn on_skipped(&self, ctx: &SyncContext, reason: &str) {
        for o in &self.observers {
            o.on_skipped(ctx, reason);
        }
    }

    fn on_failure(&self, ctx: &SyncContext, severity: Severity, error: &SyncError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &SyncContext, severity: Severity, error: &SyncError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Emits sync events as `tracing` events.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn on_synced(&self, ctx: &SyncContext, report: &UpsertReport) {
        tracing::info!(
            document_id = %ctx.document_id,
            table_id = %ctx.table_id,
            table = %ctx.target,
            rows_staged = report.rows_staged,
            rows_deleted = report.rows_deleted,
            rows_inserted = report.rows_inserted,
            "table synced"
        );
    }

    fn on_skipped(&self, ctx: &SyncContext, reason: &str) {
        tracing::warn!(
            document_id = %ctx.document_id,
            table_id = %ctx.table_id,
            table = %ctx.target,
            reason,
            "table skipped"
        );
    }

    fn on_failure(&self, ctx: &SyncContext, severity: Severity, error: &SyncError) {
        tracing::error!(
            document_id = %ctx.document_id,
            table_id = %ctx.table_id,
            table = %ctx.target,
            ?severity,
            error = %error,
            "table sync failed"
        );
    }

    fn on_alert(&self, ctx: &SyncContext, severity: Severity, error: &SyncError) {
        tracing::error!(
            alert = true,
            document_id = %ctx.document_id,
            table_id = %ctx.table_id,
            table = %ctx.target,
            ?severity,
            error = %error,
            "ALERT: table sync failed"
        );
    }
}

/// Appends sync events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Observer appending one line per event to `path`.
    ///
    /// The file is opened per event; I/O errors are dropped so a bad log path never fails a sync.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _serialized = self.lock.lock().ok();
        let opened = OpenOptions::new().create(true).append(true).open(&self.path);
        if let Ok(mut file) = opened {
            let _ = writeln!(file, "{line}");
        }
    }
}

impl SyncObserver for FileObserver {
    fn on_synced(&self, ctx: &SyncContext, report: &UpsertReport) {
        self.append_line(&format!(
            "{} ok table={} document={} source_table={} staged={} deleted={} inserted={}",
            unix_ts(),
            ctx.target,
            ctx.document_id,
            ctx.table_id,
            report.rows_staged,
            report.rows_deleted,
            report.rows_inserted
        ));
    }

    fn on_skipped(&self, ctx: &SyncContext, reason: &str) {
        self.append_line(&format!(
            "{} skip table={} document={} source_table={} reason={reason}",
            unix_ts(),
            ctx.target,
            ctx.document_id,
            ctx.table_id
        ));
    }

    fn on_failure(&self, ctx: &SyncContext, severity: Severity, error: &SyncError) {
        self.append_line(&format!(
            "{} fail severity={severity:?} table={} document={} source_table={} err={error}",
            unix_ts(),
            ctx.target,
            ctx.document_id,
            ctx.table_id
        ));
    }

    fn on_alert(&self, ctx: &SyncContext, severity: Severity, error: &SyncError) {
        self.append_line(&format!(
            "{} ALERT severity={severity:?} table={} document={} source_table={} err={error}",
            unix_ts(),
            ctx.target,
            ctx.document_id,
            ctx.table_id
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
