//! Staged upsert of a snapshot into a warehouse table.
//!
//! [`StagedUpserter`] replaces rows by key:
//!
//! 1. `CREATE TABLE` a per-run staging table next to the target, typed from the snapshot
//! 2. load the snapshot into it with batched, parameterized `INSERT`s
//! 3. delete every target row whose key tuple appears in the staging table
//! 4. insert every staging row into the target
//! 5. drop the staging table
//!
//! Steps 1-5 run in one transaction. On failure the transaction is rolled back and a
//! `DROP TABLE IF EXISTS` of the staging table is attempted regardless; the error names the
//! target. Nothing is sent to the warehouse until the snapshot passed every precondition, and an
//! empty snapshot never reaches the warehouse at all. A missing target is reported as a
//! precondition failure before the transaction starts.
//!
//! [`MergeUpserter`] is the merge-style variant: a persistent `<table>_temp` staging table is
//! cleared and reloaded, then merged into the target on a composite key.
//!
//! Concurrent runs against the same target are not serialized; callers must do that.

use std::collections::HashMap;

use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_STAGING_PREFIX};
use crate::error::{SyncError, SyncResult, WarehouseError, WarehouseResult};
use crate::types::{DataType, Snapshot, Value};
use crate::warehouse::dialect::validate_identifier;
use crate::warehouse::{Dialect, TableName, Warehouse};

/// Options shared by both upsert strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOptions {
    /// Prefix of per-run staging table names.
    pub staging_prefix: String,
    /// Rows per staging `INSERT` statement (capped by the backend's parameter limit).
    pub batch_size: usize,
}

impl Default for UpsertOptions {
    fn default() -> Self {
        Self {
            staging_prefix: DEFAULT_STAGING_PREFIX.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// What a successful sync did to the warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertReport {
    /// Table that was synchronized.
    pub target: TableName,
    /// Staging table used for the run.
    pub staging_table: TableName,
    /// Rows loaded into the staging table.
    pub rows_staged: usize,
    /// Target rows deleted because their key was in the snapshot.
    pub rows_deleted: u64,
    /// Target rows inserted (or, for a merge, inserted and updated).
    pub rows_inserted: u64,
}

/// Result of a sync call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The snapshot was applied.
    Applied(UpsertReport),
    /// The snapshot had no rows; the warehouse was not touched.
    SkippedEmpty,
}

impl UpsertOutcome {
    /// The report, when the snapshot was applied.
    pub fn report(&self) -> Option<&UpsertReport> {
        match self {
            UpsertOutcome::Applied(report) => Some(report),
            UpsertOutcome::SkippedEmpty => None,
        }
    }
}

/// Name of the staging table this process uses for `target`.
///
/// `{prefix}_{target}_{pid}`, in the target's schema, shortened to fit the dialect's identifier
/// limit (the process-id suffix is always kept).
pub fn staging_table_name(dialect: Dialect, prefix: &str, target: &TableName) -> TableName {
    staging_name_with_suffix(dialect, prefix, target, &std::process::id().to_string())
}

fn staging_name_with_suffix(
    dialect: Dialect,
    prefix: &str,
    target: &TableName,
    suffix: &str,
) -> TableName {
    let suffix = format!("_{suffix}");
    let budget = dialect.max_identifier_len().saturating_sub(suffix.len());
    let mut base = format!("{prefix}_{}", target.name);
    if base.len() > budget {
        let mut cut = budget;
        while !base.is_char_boundary(cut) {
            cut -= 1;
        }
        base.truncate(cut);
    }
    TableName::new(target.schema.clone(), base + &suffix)
}

/// Check everything about `snapshot` that the sync relies on, without touching the warehouse.
///
/// Fails with [`SyncError::Precondition`] when the key list is empty, a key column is missing,
/// a row has the wrong width, a key cell is null, or two rows share a key tuple.
pub fn check_preconditions<S: AsRef<str>>(
    snapshot: &Snapshot,
    target: &TableName,
    key_columns: &[S],
) -> SyncResult<()> {
    let fail = |message: String| SyncError::precondition(target.to_string(), message);

    validate_identifier(&target.name).map_err(|m| fail(format!("target table: {m}")))?;
    if let Some(schema) = &target.schema {
        validate_identifier(schema).map_err(|m| fail(format!("target schema: {m}")))?;
    }
    for name in snapshot.schema.field_names() {
        validate_identifier(name).map_err(|m| fail(format!("column: {m}")))?;
    }

    if key_columns.is_empty() {
        return Err(fail("no reconciliation key columns given".to_string()));
    }
    let mut key_idxs = Vec::with_capacity(key_columns.len());
    for key in key_columns {
        let key = key.as_ref();
        let idx = snapshot.schema.index_of(key).ok_or_else(|| {
            fail(format!(
                "key column '{key}' not found in snapshot columns [{}]",
                snapshot.column_names().join(", ")
            ))
        })?;
        key_idxs.push(idx);
    }

    let width = snapshot.schema.len();
    let column_types: Vec<DataType> = snapshot.schema.fields.iter().map(|f| f.data_type).collect();
    let mut seen: HashMap<String, usize> = HashMap::with_capacity(snapshot.row_count());
    for (row_idx, row) in snapshot.rows.iter().enumerate() {
        if row.len() != width {
            return Err(fail(format!(
                "row {} has {} cells, expected {width}",
                row_idx + 1,
                row.len()
            )));
        }
        for (&idx, key) in key_idxs.iter().zip(key_columns) {
            if row[idx].is_null() {
                return Err(fail(format!(
                    "key column '{}' is null in row {}",
                    key.as_ref(),
                    row_idx + 1
                )));
            }
        }
        // Compare keys as they will be staged, after widening to the column type.
        let tuple = key_idxs
            .iter()
            .map(|&idx| row[idx].coerce_to(column_types[idx]).key_repr())
            .collect::<Vec<_>>()
            .join("\u{1f}");
        if let Some(first) = seen.insert(tuple, row_idx) {
            let shown = key_idxs
                .iter()
                .zip(key_columns)
                .map(|(&idx, key)| format!("{}={}", key.as_ref(), row[idx]))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(fail(format!(
                "duplicate key ({shown}) in rows {} and {}",
                first + 1,
                row_idx + 1
            )));
        }
    }

    Ok(())
}

fn check_batch_size(batch_size: usize) -> SyncResult<()> {
    if batch_size == 0 {
        return Err(SyncError::config("batch_size must be > 0"));
    }
    Ok(())
}

/// Load every row of `snapshot` into `table` with multi-row parameterized inserts.
fn stage_rows(
    warehouse: &mut dyn Warehouse,
    table: &TableName,
    snapshot: &Snapshot,
    batch_size: usize,
) -> WarehouseResult<usize> {
    let dialect = warehouse.dialect();
    let width = snapshot.schema.len().max(1);
    let rows_per_statement = batch_size.min(dialect.max_params() / width).max(1);
    let types: Vec<DataType> = snapshot.schema.fields.iter().map(|f| f.data_type).collect();

    let mut staged = 0;
    for chunk in snapshot.rows.chunks(rows_per_statement) {
        let sql = dialect.insert_values(table, &snapshot.schema, chunk.len());
        let params: Vec<Value> = chunk
            .iter()
            .flat_map(|row| row.iter().zip(&types).map(|(v, t)| v.coerce_to(*t)))
            .collect();
        warehouse.execute(&sql, &params)?;
        staged += chunk.len();
    }
    tracing::debug!(staging = %table, rows = staged, "staged rows");
    Ok(staged)
}

/// Commit `applied` or roll it back; either way the result names `target`.
fn finish_transaction<T>(
    warehouse: &mut dyn Warehouse,
    target: &TableName,
    applied: WarehouseResult<T>,
) -> SyncResult<T> {
    match applied.and_then(|value| warehouse.commit().map(|()| value)) {
        Ok(value) => Ok(value),
        Err(source) => {
            tracing::error!(table = %target, error = %source, "sync failed, rolling back");
            if let Err(e) = warehouse.rollback() {
                tracing::warn!(table = %target, error = %e, "rollback failed");
            }
            Err(transaction_failed(target, source))
        }
    }
}

/// The target must exist before anything is staged next to it.
fn require_target(warehouse: &mut dyn Warehouse, target: &TableName) -> SyncResult<()> {
    match warehouse.table_exists(target) {
        Ok(true) => Ok(()),
        Ok(false) => Err(SyncError::precondition(
            target.to_string(),
            "target table does not exist",
        )),
        Err(e) => Err(transaction_failed(target, e)),
    }
}

fn transaction_failed(target: &TableName, source: WarehouseError) -> SyncError {
    SyncError::Transaction {
        target: target.to_string(),
        source,
    }
}

/// Replace-or-insert by key through a per-run staging table.
#[derive(Debug, Clone, Default)]
pub struct StagedUpserter {
    options: UpsertOptions,
}

impl StagedUpserter {
    pub fn new(options: UpsertOptions) -> Self {
        Self { options }
    }

    /// Synchronize `target` with `snapshot` on `key_columns`.
    ///
    /// Rows whose key is in the snapshot end up with exactly the snapshot's values, new keys are
    /// inserted, and every other target row is left alone. On error the target is unchanged.
    pub fn upsert<S: AsRef<str>>(
        &self,
        warehouse: &mut dyn Warehouse,
        snapshot: &Snapshot,
        target: &TableName,
        key_columns: &[S],
    ) -> SyncResult<UpsertOutcome> {
        check_batch_size(self.options.batch_size)?;
        check_preconditions(snapshot, target, key_columns)?;
        if snapshot.is_empty() {
            tracing::info!(table = %target, "snapshot is empty, nothing to sync");
            return Ok(UpsertOutcome::SkippedEmpty);
        }
        require_target(warehouse, target)?;

        let staging = staging_table_name(warehouse.dialect(), &self.options.staging_prefix, target);
        tracing::info!(
            table = %target,
            staging = %staging,
            rows = snapshot.row_count(),
            "upserting snapshot"
        );

        let result = match warehouse.begin() {
            Ok(()) => {
                let applied = self.apply(warehouse, snapshot, target, &staging, key_columns);
                finish_transaction(warehouse, target, applied)
            }
            Err(e) => Err(transaction_failed(target, e)),
        };

        let drop_sql = warehouse.dialect().drop_table_if_exists(&staging);
        if let Err(e) = warehouse.execute(&drop_sql, &[]) {
            tracing::warn!(staging = %staging, error = %e, "could not drop staging table");
        }

        let (rows_deleted, rows_inserted) = result?;
        tracing::info!(table = %target, rows_deleted, rows_inserted, "upsert committed");
        Ok(UpsertOutcome::Applied(UpsertReport {
            target: target.clone(),
            staging_table: staging,
            rows_staged: snapshot.row_count(),
            rows_deleted,
            rows_inserted,
        }))
    }

    fn apply<S: AsRef<str>>(
        &self,
        warehouse: &mut dyn Warehouse,
        snapshot: &Snapshot,
        target: &TableName,
        staging: &TableName,
        key_columns: &[S],
    ) -> WarehouseResult<(u64, u64)> {
        let dialect = warehouse.dialect();
        warehouse.execute(&dialect.create_table(staging, &snapshot.schema), &[])?;
        stage_rows(warehouse, staging, snapshot, self.options.batch_size)?;

        let deleted = warehouse.execute(&dialect.delete_matching(target, staging, key_columns), &[])?;
        let columns = snapshot.column_names();
        let inserted = warehouse.execute(&dialect.insert_select(target, staging, columns.as_slice()), &[])?;

        warehouse.execute(&dialect.drop_table_if_exists(staging), &[])?;
        Ok((deleted, inserted))
    }
}

/// Settings of a merge-style sync.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergeSpec {
    /// Composite reconciliation key.
    pub key_columns: Vec<String>,
    /// Columns overwritten on match (and inserted otherwise).
    pub value_columns: Vec<String>,
    /// Schema of the persistent staging table; defaults to the target's.
    pub staging_schema: Option<String>,
    /// Turn empty strings and `"null"` into nulls before loading.
    pub blank_as_null: bool,
}

/// Merge-style sync through a persistent staging table.
///
/// The staging table `<target>_temp` is created like the target when absent, emptied at the
/// start of every run, reloaded and then merged. It is left in place afterwards.
#[derive(Debug, Clone)]
pub struct MergeUpserter {
    spec: MergeSpec,
    batch_size: usize,
}

impl MergeUpserter {
    pub fn new(spec: MergeSpec, batch_size: usize) -> Self {
        Self { spec, batch_size }
    }

    /// The persistent staging table used for `target`.
    pub fn staging_table(&self, target: &TableName) -> TableName {
        TableName::new(
            self.spec
                .staging_schema
                .clone()
                .or_else(|| target.schema.clone()),
            format!("{}_temp", target.name),
        )
    }

    /// Columns written on insert: key columns missing from the value list, then the values.
    fn insert_columns(&self) -> Vec<&str> {
        let keys = self
            .spec
            .key_columns
            .iter()
            .filter(|k| !self.spec.value_columns.contains(k));
        keys.chain(self.spec.value_columns.iter())
            .map(String::as_str)
            .collect()
    }

    fn update_columns(&self) -> Vec<&str> {
        self.spec
            .value_columns
            .iter()
            .filter(|c| !self.spec.key_columns.contains(c))
            .map(String::as_str)
            .collect()
    }

    /// Merge `snapshot` into `target`.
    pub fn merge(
        &self,
        warehouse: &mut dyn Warehouse,
        snapshot: &Snapshot,
        target: &TableName,
    ) -> SyncResult<UpsertOutcome> {
        check_batch_size(self.batch_size)?;

        let cleaned;
        let snapshot = if self.spec.blank_as_null {
            cleaned = snapshot.nullify_blanks();
            &cleaned
        } else {
            snapshot
        };

        check_preconditions(snapshot, target, self.spec.key_columns.as_slice())?;
        if self.spec.value_columns.is_empty() {
            return Err(SyncError::precondition(
                target.to_string(),
                "merge requires at least one value column",
            ));
        }
        for col in &self.spec.value_columns {
            if !snapshot.schema.contains(col) {
                return Err(SyncError::precondition(
                    target.to_string(),
                    format!("value column '{col}' not found in snapshot"),
                ));
            }
        }
        let staging = self.staging_table(target);
        validate_identifier(&staging.name)
            .map_err(|m| SyncError::precondition(target.to_string(), format!("staging table: {m}")))?;

        if snapshot.is_empty() {
            tracing::info!(table = %target, "snapshot is empty, nothing to merge");
            return Ok(UpsertOutcome::SkippedEmpty);
        }
        require_target(warehouse, target)?;

        let insert_columns = self.insert_columns();
        let projected = snapshot.select(&insert_columns);
        tracing::info!(
            table = %target,
            staging = %staging,
            rows = projected.row_count(),
            "merging snapshot"
        );

        warehouse
            .begin()
            .map_err(|e| transaction_failed(target, e))?;
        let applied = self.apply(warehouse, &projected, target, &staging, &insert_columns);
        let rows_written = finish_transaction(warehouse, target, applied)?;

        tracing::info!(table = %target, rows_written, "merge committed");
        Ok(UpsertOutcome::Applied(UpsertReport {
            target: target.clone(),
            staging_table: staging,
            rows_staged: projected.row_count(),
            rows_deleted: 0,
            rows_inserted: rows_written,
        }))
    }

    fn apply(
        &self,
        warehouse: &mut dyn Warehouse,
        projected: &Snapshot,
        target: &TableName,
        staging: &TableName,
        insert_columns: &[&str],
    ) -> WarehouseResult<u64> {
        let dialect = warehouse.dialect();
        warehouse.execute(&dialect.create_like_if_absent(staging, target), &[])?;
        let cleared = warehouse.execute(&dialect.clear_table(staging), &[])?;
        tracing::debug!(staging = %staging, rows = cleared, "cleared staging table");
        stage_rows(warehouse, staging, projected, self.batch_size)?;

        let keys: Vec<&str> = self.spec.key_columns.iter().map(String::as_str).collect();
        let updates = self.update_columns();
        let mut written = 0;
        for sql in dialect.merge(target, staging, keys.as_slice(), updates.as_slice(), insert_columns) {
            written += warehouse.execute(&sql, &[])?;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(rows: Vec<Vec<Value>>) -> Snapshot {
        Snapshot::from_rows(vec!["sku".into(), "tab".into(), "notes".into()], rows)
    }

    fn row(sku: &str, tab: &str, notes: &str) -> Vec<Value> {
        vec![Value::from(sku), Value::from(tab), Value::from(notes)]
    }

    #[test]
    fn staging_name_keeps_suffix_when_truncated() {
        let target = TableName::new(Some("ops".into()), "t".repeat(200));
        let name = staging_name_with_suffix(Dialect::Redshift, "coda_staging", &target, "4242");
        assert_eq!(name.name.len(), Dialect::Redshift.max_identifier_len());
        assert!(name.name.starts_with("coda_staging_ttt"));
        assert!(name.name.ends_with("_4242"));
        assert_eq!(name.schema.as_deref(), Some("ops"));
    }

    #[test]
    fn staging_name_is_per_process() {
        let name = staging_table_name(Dialect::Sqlite, "stage", &TableName::unqualified("skus"));
        assert_eq!(name.name, format!("stage_skus_{}", std::process::id()));
    }

    #[test]
    fn duplicate_key_tuples_are_rejected() {
        let snap = snapshot(vec![row("a", "x", "1"), row("a", "y", "2"), row("a", "x", "3")]);
        let target = TableName::unqualified("t");
        assert!(check_preconditions(&snap, &target, &["sku"]).is_err());
        let err = check_preconditions(&snap, &target, &["sku", "tab"]).unwrap_err();
        assert!(err.to_string().contains("rows 1 and 3"), "{err}");
    }

    #[test]
    fn null_keys_are_rejected() {
        let snap = snapshot(vec![vec![Value::Null, Value::from("x"), Value::Null]]);
        let err = check_preconditions(&snap, &TableName::unqualified("t"), &["sku"]).unwrap_err();
        assert!(err.to_string().contains("is null in row 1"));
    }

    #[test]
    fn empty_key_list_is_rejected() {
        let none: [&str; 0] = [];
        let err = check_preconditions(&snapshot(vec![]), &TableName::unqualified("t"), &none)
            .unwrap_err();
        assert!(matches!(err, SyncError::Precondition { .. }));
    }

    #[test]
    fn merge_columns_put_missing_keys_first() {
        let merger = MergeUpserter::new(
            MergeSpec {
                key_columns: vec!["sku".into(), "privilege".into()],
                value_columns: vec!["privilege".into(), "notes".into()],
                ..Default::default()
            },
            10,
        );
        assert_eq!(merger.insert_columns(), vec!["sku", "privilege", "notes"]);
        assert_eq!(merger.update_columns(), vec!["notes"]);
        assert_eq!(
            merger.staging_table(&TableName::new(Some("ops".into()), "skus")),
            TableName::new(Some("ops".into()), "skus_temp")
        );
    }
}
