//! Read-only warehouse lookups.
//!
//! Lookup values are always bound as parameters; only identifiers (quoted) are formatted into
//! the SQL text.

use crate::error::{SyncError, SyncResult};
use crate::types::{Snapshot, Value};
use crate::warehouse::dialect::validate_identifier;
use crate::warehouse::{TableName, Warehouse};

/// Where provisioning lines live in the warehouse.
pub const DEFAULT_PROVISIONING_TABLE: &str = "source_ops_sfdc_production_current.provisioning_line__c";

/// Columns returned by [`fetch_active_provisioning_lines`].
pub const PROVISIONING_COLUMNS: [&str; 17] = [
    "id",
    "license_name__c",
    "product_name__c",
    "quantity_allocated__c",
    "unlimited_quantity__c",
    "brand_account__c",
    "active__c",
    "lms_configuration__c",
    "start_date__c",
    "expiration_date__c",
    "istrial__c",
    "migrated_active__c",
    "migrated__c",
    "lastmodifieddate",
    "contract__c",
    "subscription__c",
    "quote_line__c",
];

/// Active, currently valid, activated provisioning lines of one brand.
///
/// A line is returned when its start date is not in the future, its expiration date is not in
/// the past, it is flagged active and its LMS configuration status is `Activated`.
pub fn fetch_active_provisioning_lines(
    warehouse: &mut dyn Warehouse,
    table: &TableName,
    brand_id: &str,
) -> SyncResult<Snapshot> {
    let brand_id = brand_id.trim();
    if brand_id.is_empty() {
        return Err(SyncError::config("brand id is empty"));
    }

    let dialect = warehouse.dialect();
    let columns = PROVISIONING_COLUMNS
        .iter()
        .map(|c| dialect.quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {columns} FROM {} \
         WHERE {} = {} \
         AND {} <= CURRENT_DATE \
         AND {} >= CURRENT_DATE \
         AND {} = true \
         AND {} = 'Activated'",
        dialect.table(table),
        dialect.quote_ident("brand_id__c"),
        dialect.placeholder(1),
        dialect.quote_ident("start_date__c"),
        dialect.quote_ident("expiration_date__c"),
        dialect.quote_ident("active__c"),
        dialect.quote_ident("lms_config_status__c"),
    );

    let lines = warehouse
        .query(&sql, &[Value::from(brand_id)])
        .map_err(SyncError::Query)?;
    tracing::info!(brand_id, rows = lines.row_count(), "fetched provisioning lines");
    Ok(lines)
}

/// Every row of `table` whose `column` equals `value`, with the given columns (all when empty).
pub fn fetch_matching(
    warehouse: &mut dyn Warehouse,
    table: &TableName,
    columns: &[&str],
    column: &str,
    value: Value,
) -> SyncResult<Snapshot> {
    for ident in columns.iter().copied().chain([column]) {
        validate_identifier(ident).map_err(|m| SyncError::config(m))?;
    }

    let dialect = warehouse.dialect();
    let projection = if columns.is_empty() {
        "*".to_string()
    } else {
        columns
            .iter()
            .map(|c| dialect.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let sql = format!(
        "SELECT {projection} FROM {} WHERE {} = {}",
        dialect.table(table),
        dialect.quote_ident(column),
        dialect.placeholder(1)
    );
    warehouse.query(&sql, &[value]).map_err(SyncError::Query)
}
