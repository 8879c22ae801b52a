use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tablesync::SyncError;
#[cfg(not(feature = "redshift"))]
use tablesync::config::ConnectionKind;
use tablesync::config::{SyncConfig, WarehouseConfig};
use tablesync::error::{WarehouseError, WarehouseResult};
use tablesync::observability::{FileObserver, Severity, SyncContext, SyncObserver};
use tablesync::pipeline::{Pipeline, TableOutcome};
use tablesync::source::FileSource;
use tablesync::types::Value;
use tablesync::upsert::UpsertReport;
use tablesync::warehouse::{SqliteWarehouse, Warehouse};

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl SyncObserver for RecordingObserver {
    fn on_synced(&self, ctx: &SyncContext, report: &UpsertReport) {
        self.push(format!("synced {} {}", ctx.table_id, report.rows_staged));
    }

    fn on_skipped(&self, ctx: &SyncContext, _reason: &str) {
        self.push(format!("skipped {}", ctx.table_id));
    }

    fn on_failure(&self, ctx: &SyncContext, severity: Severity, _error: &SyncError) {
        self.push(format!("failed {} {severity:?}", ctx.table_id));
    }

    fn on_alert(&self, ctx: &SyncContext, severity: Severity, _error: &SyncError) {
        self.push(format!("alert {} {severity:?}", ctx.table_id));
    }
}

const CONFIG: &str = r#"
document_id = "doc1"
staging_prefix = "stage"

[[tables]]
table_id = "skus"
target_table = "skus"
key_columns = ["sku"]

[[tables]]
table_id = "empty"
target_table = "skus"
key_columns = ["sku"]

[[tables]]
table_id = "missing"
target_table = "skus"
key_columns = ["sku"]

[[tables]]
table_id = "skus"
target_table = "skus"
key_columns = ["product_code"]

[[tables]]
document_id = "doc2"
table_id = "privileges"
target_table = "sku_privileges"
key_columns = ["sku", "privilege"]
mode = "merge"
value_columns = ["enabled"]
"#;

fn fixtures(root: &Path) {
    let doc1 = root.join("doc1");
    let doc2 = root.join("doc2");
    fs::create_dir_all(&doc1).unwrap();
    fs::create_dir_all(&doc2).unwrap();
    fs::write(doc1.join("skus.csv"), "SKU,Tier,Notes\nA,10,new a\nD,4,\n").unwrap();
    fs::write(doc1.join("empty.csv"), "SKU,Tier,Notes\n").unwrap();
    fs::write(
        doc2.join("privileges.json"),
        r#"[{"SKU": "A", "Privilege": "p1", "Enabled": false}]"#,
    )
    .unwrap();
}

fn seed(db: &Path) {
    let mut wh = SqliteWarehouse::open(db).unwrap();
    wh.execute("CREATE TABLE skus (sku TEXT, tier INTEGER, notes TEXT)", &[])
        .unwrap();
    wh.execute(
        "INSERT INTO skus VALUES ('A', 1, 'old a'), ('B', 2, 'old b')",
        &[],
    )
    .unwrap();
    wh.execute(
        "CREATE TABLE sku_privileges (sku TEXT, privilege TEXT, enabled INTEGER)",
        &[],
    )
    .unwrap();
    wh.execute("INSERT INTO sku_privileges VALUES ('A', 'p1', 1)", &[])
        .unwrap();
}

#[test]
fn pipeline_continues_past_failed_tables() {
    let tmp = tempfile::tempdir().unwrap();
    fixtures(tmp.path());
    let db = tmp.path().join("dw.sqlite");
    seed(&db);

    let observer = Arc::new(RecordingObserver::default());
    let config = SyncConfig::from_toml_str(CONFIG).unwrap();
    let report = Pipeline::new(FileSource::new(tmp.path()), WarehouseConfig::sqlite(&db))
        .with_observer(observer.clone())
        .with_alert_threshold(Severity::Error)
        .run(&config)
        .unwrap();

    assert_eq!(report.tables.len(), 5);
    assert_eq!(report.synced(), 2);
    assert_eq!(report.skipped(), 1);
    assert_eq!(report.failed(), 2);
    assert!(report.has_failures());
    assert!(matches!(
        report.tables[2].outcome,
        TableOutcome::Failed {
            error: SyncError::Extraction { .. }
        }
    ));
    assert!(matches!(
        report.tables[3].outcome,
        TableOutcome::Failed {
            error: SyncError::Precondition { .. }
        }
    ));
    assert_eq!(report.tables[4].context.document_id, "doc2");

    assert_eq!(
        observer.events(),
        vec![
            "synced skus 2",
            "skipped empty",
            "failed missing Error",
            "alert missing Error",
            "failed skus Error",
            "alert skus Error",
            "synced privileges 1",
        ]
    );

    let mut wh = SqliteWarehouse::open(&db).unwrap();
    let skus = wh
        .query("SELECT sku, tier, notes FROM skus ORDER BY sku", &[])
        .unwrap()
        .rows;
    assert_eq!(
        skus,
        vec![
            vec![Value::from("A"), Value::Int64(10), Value::from("new a")],
            vec![Value::from("B"), Value::Int64(2), Value::from("old b")],
            vec![Value::from("D"), Value::Int64(4), Value::Null],
        ]
    );
    let enabled = wh
        .query("SELECT enabled FROM sku_privileges", &[])
        .unwrap()
        .rows;
    assert_eq!(enabled, vec![vec![Value::Int64(0)]]);
}

#[test]
fn connection_failures_are_reported_per_table() {
    let tmp = tempfile::tempdir().unwrap();
    fixtures(tmp.path());
    let config = SyncConfig::from_toml_str(CONFIG).unwrap();

    let connector = || -> WarehouseResult<Box<dyn Warehouse>> {
        Err(WarehouseError::Unsupported {
            message: "warehouse unreachable".to_string(),
        })
    };
    let observer = Arc::new(RecordingObserver::default());
    let report = Pipeline::new(FileSource::new(tmp.path()), connector)
        .with_observer(observer.clone())
        .run(&config)
        .unwrap();

    let connection_failures = report
        .tables
        .iter()
        .filter(|t| {
            matches!(
                t.outcome,
                TableOutcome::Failed {
                    error: SyncError::Connection(_)
                }
            )
        })
        .count();
    assert_eq!(connection_failures, 2);
    assert_eq!(report.skipped(), 1);
    assert!(observer.events().contains(&"alert privileges Critical".to_string()));
}

#[test]
fn headerless_empty_tables_are_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let doc = tmp.path().join("doc1");
    fs::create_dir_all(&doc).unwrap();
    fs::write(doc.join("none.json"), "[]").unwrap();
    fs::write(doc.join("blank.json"), "  \n").unwrap();
    fs::write(doc.join("header.csv"), "SKU,Tier\n").unwrap();
    let db = tmp.path().join("dw.sqlite");
    seed(&db);

    let config = SyncConfig::from_toml_str(
        r#"
        document_id = "doc1"

        [[tables]]
        table_id = "none"
        target_table = "skus"
        key_columns = ["k"]

        [[tables]]
        table_id = "blank"
        target_table = "skus"
        key_columns = ["k"]

        [[tables]]
        table_id = "header"
        target_table = "skus"
        key_columns = ["k"]
        "#,
    )
    .unwrap();
    let report = Pipeline::new(FileSource::new(tmp.path()), WarehouseConfig::sqlite(&db))
        .run(&config)
        .unwrap();

    assert_eq!(report.skipped(), 2);
    assert!(matches!(
        report.tables[2].outcome,
        TableOutcome::Failed {
            error: SyncError::Precondition { .. }
        }
    ));
}

#[test]
fn invalid_config_stops_before_any_table() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = SyncConfig::from_toml_str(CONFIG).unwrap();
    config.batch_size = 0;

    let err = Pipeline::new(
        FileSource::new(tmp.path()),
        WarehouseConfig::sqlite(tmp.path().join("dw.sqlite")),
    )
    .run(&config)
    .unwrap_err();
    assert!(matches!(err, SyncError::Config { .. }));
}

#[cfg(not(feature = "redshift"))]
#[test]
fn network_warehouse_without_driver_stops_before_extraction() {
    let tmp = tempfile::tempdir().unwrap();
    fixtures(tmp.path());
    let config = SyncConfig::from_toml_str(CONFIG).unwrap();
    let warehouse = WarehouseConfig {
        kind: ConnectionKind::Redshift,
        user: "u".into(),
        password: "p".into(),
        host: "warehouse.invalid".into(),
        port: 5439,
        database: "warehouse".into(),
        path: None,
    };

    let observer = Arc::new(RecordingObserver::default());
    let err = Pipeline::new(FileSource::new(tmp.path()), warehouse)
        .with_observer(observer.clone())
        .run(&config)
        .unwrap_err();

    assert!(matches!(err, SyncError::Config { .. }), "{err}");
    assert!(observer.events().is_empty());
}

#[test]
fn file_observer_appends_one_line_per_event() {
    let tmp = tempfile::tempdir().unwrap();
    fixtures(tmp.path());
    let db = tmp.path().join("dw.sqlite");
    seed(&db);
    let log = tmp.path().join("events.log");

    let config = SyncConfig::from_toml_str(CONFIG).unwrap();
    Pipeline::new(FileSource::new(tmp.path()), WarehouseConfig::sqlite(&db))
        .with_observer(Arc::new(FileObserver::new(&log)))
        .run(&config)
        .unwrap();

    let text = fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].contains(" ok table=skus document=doc1"));
    assert!(lines[1].contains(" skip table=skus"));
    assert!(lines[2].contains(" fail severity=Error"));
}
