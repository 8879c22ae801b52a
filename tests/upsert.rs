use tablesync::error::{SyncError, WarehouseError, WarehouseResult};
use tablesync::types::{Snapshot, Value};
use tablesync::upsert::{StagedUpserter, UpsertOptions, UpsertOutcome, staging_table_name};
use tablesync::warehouse::{Dialect, SqliteWarehouse, TableName, Warehouse};

/// Records every statement and optionally fails the first one starting with `fail_on`.
struct Recording<W> {
    inner: W,
    statements: Vec<String>,
    fail_on: Option<&'static str>,
}

impl<W: Warehouse> Recording<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            statements: Vec::new(),
            fail_on: None,
        }
    }

    fn failing_on(inner: W, prefix: &'static str) -> Self {
        Self {
            fail_on: Some(prefix),
            ..Self::new(inner)
        }
    }
}

impl<W: Warehouse> Warehouse for Recording<W> {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> WarehouseResult<u64> {
        self.statements.push(sql.to_string());
        if self.fail_on.is_some_and(|prefix| sql.starts_with(prefix)) {
            return Err(WarehouseError::Unsupported {
                message: "injected failure".to_string(),
            });
        }
        self.inner.execute(sql, params)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> WarehouseResult<Snapshot> {
        self.statements.push(sql.to_string());
        self.inner.query(sql, params)
    }

    fn table_exists(&mut self, table: &TableName) -> WarehouseResult<bool> {
        self.inner.table_exists(table)
    }

    fn close(self: Box<Self>) -> WarehouseResult<()> {
        Box::new(self.inner).close()
    }
}

fn target() -> TableName {
    TableName::unqualified("skus")
}

fn seeded() -> SqliteWarehouse {
    let mut wh = SqliteWarehouse::open_in_memory().unwrap();
    wh.execute("CREATE TABLE skus (sku TEXT, tier INTEGER, notes TEXT)", &[])
        .unwrap();
    wh.execute(
        "INSERT INTO skus VALUES ('A', 1, 'old a'), ('B', 2, 'old b'), ('C', 3, 'old c')",
        &[],
    )
    .unwrap();
    wh
}

fn contents(wh: &mut dyn Warehouse) -> Vec<Vec<Value>> {
    wh.query("SELECT sku, tier, notes FROM skus ORDER BY sku", &[])
        .unwrap()
        .rows
}

fn snapshot(rows: &[(&str, i64, Option<&str>)]) -> Snapshot {
    Snapshot::from_rows(
        vec!["sku".into(), "tier".into(), "notes".into()],
        rows.iter()
            .map(|(sku, tier, notes)| vec![Value::from(*sku), Value::Int64(*tier), Value::from(*notes)])
            .collect(),
    )
}

fn row(sku: &str, tier: i64, notes: Option<&str>) -> Vec<Value> {
    vec![Value::from(sku), Value::Int64(tier), Value::from(notes)]
}

#[test]
fn replaces_matched_rows_and_inserts_new_ones() {
    let mut wh = seeded();
    let snap = snapshot(&[("B", 20, Some("new b")), ("D", 4, None)]);

    let outcome = StagedUpserter::default()
        .upsert(&mut wh, &snap, &target(), &["sku"])
        .unwrap();

    let report = outcome.report().expect("applied");
    assert_eq!(report.rows_staged, 2);
    assert_eq!(report.rows_deleted, 1);
    assert_eq!(report.rows_inserted, 2);
    assert_eq!(
        contents(&mut wh),
        vec![
            row("A", 1, Some("old a")),
            row("B", 20, Some("new b")),
            row("C", 3, Some("old c")),
            row("D", 4, None),
        ]
    );
}

#[test]
fn empty_snapshot_never_touches_the_warehouse() {
    let mut wh = Recording::new(seeded());
    let before = contents(&mut wh);
    wh.statements.clear();

    let outcome = StagedUpserter::default()
        .upsert(&mut wh, &snapshot(&[]), &target(), &["sku"])
        .unwrap();

    assert_eq!(outcome, UpsertOutcome::SkippedEmpty);
    assert!(wh.statements.is_empty(), "{:?}", wh.statements);
    assert_eq!(contents(&mut wh), before);
}

#[test]
fn missing_key_column_fails_before_any_warehouse_access() {
    let mut wh = Recording::new(seeded());
    let before = contents(&mut wh);
    wh.statements.clear();

    let err = StagedUpserter::default()
        .upsert(&mut wh, &snapshot(&[("A", 9, None)]), &target(), &["product_code"])
        .unwrap_err();

    match err {
        SyncError::Precondition { target, message } => {
            assert_eq!(target, "skus");
            assert!(message.contains("product_code"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(wh.statements.is_empty());
    assert_eq!(contents(&mut wh), before);
}

#[test]
fn duplicate_keys_fail_before_any_warehouse_access() {
    let mut wh = Recording::new(seeded());
    let err = StagedUpserter::default()
        .upsert(
            &mut wh,
            &snapshot(&[("A", 1, None), ("A", 2, None)]),
            &target(),
            &["sku"],
        )
        .unwrap_err();
    assert!(matches!(err, SyncError::Precondition { .. }));
    assert!(wh.statements.is_empty());
}

fn assert_rejected_as_duplicate(keys: [Value; 2]) {
    let mut wh = Recording::new(SqliteWarehouse::open_in_memory().unwrap());
    let [first, second] = keys;
    let snap = Snapshot::from_rows(
        vec!["k".into(), "v".into()],
        vec![vec![first, Value::from("a")], vec![second, Value::from("b")]],
    );

    let err = StagedUpserter::default()
        .upsert(&mut wh, &snap, &TableName::unqualified("kv"), &["k"])
        .unwrap_err();
    assert!(matches!(err, SyncError::Precondition { .. }), "{err}");
    assert!(err.to_string().contains("rows 1 and 2"), "{err}");
    assert!(wh.statements.is_empty());
}

#[test]
fn integer_and_float_keys_that_stage_equal_are_duplicates() {
    assert_rejected_as_duplicate([Value::Int64(1), Value::Float64(1.0)]);
    assert_rejected_as_duplicate([Value::Float64(0.0), Value::Float64(-0.0)]);
}

#[test]
fn integer_and_text_keys_that_stage_equal_are_duplicates() {
    assert_rejected_as_duplicate([Value::Int64(1), Value::from("1")]);
}

#[test]
fn missing_target_is_reported_before_staging() {
    let mut wh = Recording::new(SqliteWarehouse::open_in_memory().unwrap());
    let err = StagedUpserter::default()
        .upsert(&mut wh, &snapshot(&[("A", 1, None)]), &target(), &["sku"])
        .unwrap_err();

    assert!(err.to_string().contains("does not exist"), "{err}");
    assert!(matches!(err, SyncError::Precondition { .. }));
    assert!(wh.statements.is_empty());
}

#[test]
fn failed_insert_rolls_back_the_delete() {
    let mut wh = Recording::failing_on(seeded(), "INSERT INTO \"skus\"");
    let before = contents(&mut wh);

    let err = StagedUpserter::default()
        .upsert(
            &mut wh,
            &snapshot(&[("A", 10, Some("new a")), ("E", 5, None)]),
            &target(),
            &["sku"],
        )
        .unwrap_err();

    match &err {
        SyncError::Transaction { target, .. } => assert_eq!(target, "skus"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(wh.statements.iter().any(|s| s.starts_with("DELETE FROM \"skus\"")));
    assert!(wh.statements.iter().any(|s| s == "ROLLBACK"));
    assert_eq!(contents(&mut wh), before);

    let staging = staging_table_name(Dialect::Sqlite, &UpsertOptions::default().staging_prefix, &target());
    assert!(!wh.table_exists(&staging).unwrap());
}

#[test]
fn failed_staging_load_leaves_no_staging_table() {
    let mut wh = Recording::failing_on(seeded(), "INSERT INTO \"coda_staging_skus_");
    let before = contents(&mut wh);

    let err = StagedUpserter::default()
        .upsert(&mut wh, &snapshot(&[("A", 10, None)]), &target(), &["sku"])
        .unwrap_err();

    assert!(matches!(err, SyncError::Transaction { .. }));
    assert!(wh.statements.last().unwrap().starts_with("DROP TABLE IF EXISTS"));
    let staging = staging_table_name(Dialect::Sqlite, "coda_staging", &target());
    assert!(!wh.table_exists(&staging).unwrap());
    assert_eq!(contents(&mut wh), before);
}

#[test]
fn staging_table_is_gone_after_success() {
    let mut wh = seeded();
    let outcome = StagedUpserter::default()
        .upsert(&mut wh, &snapshot(&[("A", 10, None)]), &target(), &["sku"])
        .unwrap();

    let report = outcome.report().unwrap();
    assert_eq!(
        report.staging_table,
        staging_table_name(Dialect::Sqlite, "coda_staging", &target())
    );
    assert!(!wh.table_exists(&report.staging_table).unwrap());
}

#[test]
fn repeated_sync_is_idempotent() {
    let mut once = seeded();
    let mut twice = seeded();
    let snap = snapshot(&[("B", 7, Some("b")), ("Z", 26, Some("z"))]);
    let upserter = StagedUpserter::default();

    upserter.upsert(&mut once, &snap, &target(), &["sku"]).unwrap();
    upserter.upsert(&mut twice, &snap, &target(), &["sku"]).unwrap();
    upserter.upsert(&mut twice, &snap, &target(), &["sku"]).unwrap();

    assert_eq!(contents(&mut once), contents(&mut twice));
}

#[test]
fn values_are_bound_not_interpolated() {
    let mut wh = Recording::new(seeded());
    let snap = snapshot(&[("x'); DROP TABLE skus; --", 1, Some("it's"))]);

    StagedUpserter::default()
        .upsert(&mut wh, &snap, &target(), &["sku"])
        .unwrap();

    assert!(wh.statements.iter().all(|s| !s.contains("it's")));
    let rows = contents(&mut wh);
    assert_eq!(rows.len(), 4);
    assert!(rows.contains(&row("x'); DROP TABLE skus; --", 1, Some("it's"))));
}

#[test]
fn small_batches_stage_every_row() {
    let mut wh = Recording::new(seeded());
    let snap = snapshot(&[("A", 1, None), ("B", 2, None), ("C", 3, None)]);
    let upserter = StagedUpserter::new(UpsertOptions {
        staging_prefix: "stage".into(),
        batch_size: 2,
    });

    let outcome = upserter.upsert(&mut wh, &snap, &target(), &["sku"]).unwrap();

    assert_eq!(outcome.report().unwrap().rows_staged, 3);
    let staging_inserts = wh
        .statements
        .iter()
        .filter(|s| s.starts_with("INSERT INTO \"stage_skus_"))
        .count();
    assert_eq!(staging_inserts, 2);
    assert_eq!(contents(&mut wh).len(), 3);
}

#[test]
fn composite_keys_and_schema_qualified_targets() {
    let mut wh = SqliteWarehouse::open_in_memory().unwrap();
    wh.execute("CREATE TABLE grants (sku TEXT, tab TEXT, level INTEGER)", &[])
        .unwrap();
    wh.execute(
        "INSERT INTO grants VALUES ('A', 'x', 1), ('A', 'y', 1), ('B', 'x', 1)",
        &[],
    )
    .unwrap();
    let snap = Snapshot::from_rows(
        vec!["sku".into(), "tab".into(), "level".into()],
        vec![vec![Value::from("A"), Value::from("y"), Value::Int64(5)]],
    );
    let target = TableName::new(Some("main".into()), "grants");

    let outcome = StagedUpserter::default()
        .upsert(&mut wh, &snap, &target, &["sku", "tab"])
        .unwrap();

    assert_eq!(outcome.report().unwrap().rows_deleted, 1);
    let levels = wh
        .query("SELECT sku, tab, level FROM grants ORDER BY sku, tab", &[])
        .unwrap()
        .rows;
    assert_eq!(
        levels,
        vec![
            vec![Value::from("A"), Value::from("x"), Value::Int64(1)],
            vec![Value::from("A"), Value::from("y"), Value::Int64(5)],
            vec![Value::from("B"), Value::from("x"), Value::Int64(1)],
        ]
    );
}
