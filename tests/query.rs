use tablesync::SyncError;
use tablesync::query::{PROVISIONING_COLUMNS, fetch_active_provisioning_lines, fetch_matching};
use tablesync::types::Value;
use tablesync::warehouse::{SqliteWarehouse, TableName, Warehouse};

fn provisioning_table() -> TableName {
    TableName::unqualified("provisioning_line__c")
}

/// `(id, brand, start, expiration, active, status)`
type Line<'a> = (&'a str, &'a str, &'a str, &'a str, bool, &'a str);

fn warehouse_with(lines: &[Line<'_>]) -> SqliteWarehouse {
    let mut wh = SqliteWarehouse::open_in_memory().unwrap();
    let columns = PROVISIONING_COLUMNS
        .iter()
        .map(|&c| match c {
            "active__c" => format!("{c} INTEGER"),
            _ => format!("{c} TEXT"),
        })
        .collect::<Vec<_>>()
        .join(", ");
    wh.execute(
        &format!(
            "CREATE TABLE provisioning_line__c ({columns}, brand_id__c TEXT, lms_config_status__c TEXT)"
        ),
        &[],
    )
    .unwrap();

    for (id, brand, start, expiration, active, status) in lines {
        wh.execute(
            "INSERT INTO provisioning_line__c \
             (id, brand_id__c, start_date__c, expiration_date__c, active__c, lms_config_status__c) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            &[
                Value::from(*id),
                Value::from(*brand),
                Value::from(*start),
                Value::from(*expiration),
                Value::Bool(*active),
                Value::from(*status),
            ],
        )
        .unwrap();
    }
    wh
}

#[test]
fn only_current_active_activated_lines_of_the_brand_are_returned() {
    let mut wh = warehouse_with(&[
        ("L1", "acme", "2000-01-01", "2999-12-31", true, "Activated"),
        ("L2", "acme", "2000-01-01", "2001-01-01", true, "Activated"),
        ("L3", "acme", "2000-01-01", "2999-12-31", true, "Pending"),
        ("L4", "acme", "2000-01-01", "2999-12-31", false, "Activated"),
        ("L5", "acme", "2998-01-01", "2999-12-31", true, "Activated"),
        ("L6", "other", "2000-01-01", "2999-12-31", true, "Activated"),
    ]);

    let lines = fetch_active_provisioning_lines(&mut wh, &provisioning_table(), " acme ").unwrap();

    assert_eq!(lines.column_names(), PROVISIONING_COLUMNS.to_vec());
    assert_eq!(lines.row_count(), 1);
    assert_eq!(lines.get(0, "id"), Some(&Value::from("L1")));
}

#[test]
fn brand_id_is_bound_as_a_value() {
    let mut wh = warehouse_with(&[("L1", "acme", "2000-01-01", "2999-12-31", true, "Activated")]);

    let lines =
        fetch_active_provisioning_lines(&mut wh, &provisioning_table(), "x' OR '1'='1").unwrap();
    assert!(lines.is_empty());
}

#[test]
fn blank_brand_id_is_rejected() {
    let mut wh = warehouse_with(&[]);
    let err = fetch_active_provisioning_lines(&mut wh, &provisioning_table(), "  ").unwrap_err();
    assert!(matches!(err, SyncError::Config { .. }));
}

#[test]
fn missing_table_is_a_query_error() {
    let mut wh = SqliteWarehouse::open_in_memory().unwrap();
    let err = fetch_active_provisioning_lines(&mut wh, &provisioning_table(), "acme").unwrap_err();
    assert!(matches!(err, SyncError::Query(_)), "{err}");
}

#[test]
fn fetch_matching_projects_requested_columns() {
    let mut wh = warehouse_with(&[
        ("L1", "acme", "2000-01-01", "2999-12-31", true, "Activated"),
        ("L2", "other", "2000-01-01", "2999-12-31", true, "Activated"),
    ]);

    let rows = fetch_matching(
        &mut wh,
        &provisioning_table(),
        &["id", "lms_config_status__c"],
        "brand_id__c",
        Value::from("other"),
    )
    .unwrap();

    assert_eq!(rows.column_names(), vec!["id", "lms_config_status__c"]);
    assert_eq!(
        rows.rows,
        vec![vec![Value::from("L2"), Value::from("Activated")]]
    );

    let err = fetch_matching(&mut wh, &provisioning_table(), &[], "", Value::Null).unwrap_err();
    assert!(matches!(err, SyncError::Config { .. }));
}
